// src/normalize.rs

/// One page as delivered by the extraction step: tokens in reading order.
pub type PageFragment = Vec<String>;

/// Flattened manifest text, one line per page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub lines: Vec<String>,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Join each page's tokens with single spaces and the pages with line breaks.
///
/// No row or column structure is recovered here; the parser strategies work
/// on the flattened text and must cope with tokens out of reading order.
pub fn normalize_pages(pages: &[PageFragment]) -> NormalizedText {
    let lines: Vec<String> = pages.iter().map(|page| normalize_page(page)).collect();
    NormalizedText {
        text: lines.join("\n"),
        lines,
    }
}

fn normalize_page(tokens: &[String]) -> String {
    tokens
        .iter()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
