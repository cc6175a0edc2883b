//! Language routing for harvested content.

use whatlang::Lang;

/// Where a harvested file belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// English or indeterminate content
    Primary,
    /// Confidently non-English content
    Secondary,
}

/// Routes content by language. Bytes that do not decode as UTF-8 are
/// treated as non-English unless `keep_undecodable` is set, which
/// keeps binary formats like PDF in the main tree.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    keep_undecodable: bool,
}

impl Classifier {
    pub fn new(keep_undecodable: bool) -> Self {
        Self { keep_undecodable }
    }

    pub fn classify(&self, body: &[u8]) -> Bucket {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(_) => {
                if self.keep_undecodable {
                    return Bucket::Primary;
                }
                return Bucket::Secondary;
            }
        };

        match whatlang::detect(text) {
            Some(info) if info.lang() != Lang::Eng => Bucket::Secondary,
            _ => Bucket::Primary,
        }
    }
}
