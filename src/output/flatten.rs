//! HTML to markdown-ish text conversion.

use scraper::{ElementRef, Html, Selector};

/// Flatten a documentation page to plain text. Paragraphs become
/// lines, code blocks become fenced blocks, tables become pipe
/// tables. Everything else (nav, scripts, headers) is dropped.
pub fn flatten_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();

    let body = match document.select(&body_selector).next() {
        Some(body) => body,
        None => return String::new(),
    };

    let mut out = String::new();
    for node in body.descendants() {
        let element = match ElementRef::wrap(node) {
            Some(element) => element,
            None => continue,
        };

        match element.value().name() {
            "p" => {
                out.push_str(&element.text().collect::<String>());
                out.push('\n');
            }
            "pre" => {
                out.push_str("```\n");
                out.push_str(&element.text().collect::<String>());
                out.push_str("```\n");
            }
            "table" => {
                out.push_str(&table_to_markdown(element));
                out.push('\n');
            }
            _ => {}
        }
    }

    out
}

/// Extract the plain text of an HTML fragment.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment.root_element().text().collect()
}

fn table_to_markdown(table: ElementRef) -> String {
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("th, td").unwrap();

    let mut out = String::new();
    let mut wrote_header = false;
    for row in table.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();
        if cells.is_empty() {
            continue;
        }

        out.push_str(&format!("| {} |\n", cells.join(" | ")));
        if !wrote_header {
            let separator: Vec<&str> = cells.iter().map(|_| "---").collect();
            out.push_str(&format!("| {} |\n", separator.join(" | ")));
            wrote_header = true;
        }
    }

    out
}
