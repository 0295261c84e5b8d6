//! Response formatter
//!
//! Turns raw model output into renderable pages: markdown clean-up, fenced
//! code block extraction and sentence-aware pagination.

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Default embed field limit of the chat platform
pub const FIELD_MAX_LENGTH: usize = 1024;

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(\w+)?\n([\s\S]*?)\n```").expect("code block regex is valid"));

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]\n]+)\]\(\s*([^)\s]+)\s*\)").expect("link regex is valid")
});

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break regex is valid"));

/// One renderable page of a response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Page {
    /// A chunk of prose
    Text {
        /// Page title, e.g. `AI Response (Part 2)`
        title: String,
        /// Chunk text
        body: String,
    },
    /// One extracted code block
    Code {
        /// Language tag, empty when the fence had none
        language: String,
        /// Code without the fence lines
        body: String,
    },
}

impl Page {
    /// Title shown above the page
    pub fn title(&self) -> String {
        match self {
            Page::Text { title, .. } => title.clone(),
            Page::Code { language, .. } if language.is_empty() => "Code Block".to_string(),
            Page::Code { language, .. } => format!("Code Block ({})", language),
        }
    }
}

/// Non-empty ordered pages produced from one response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSet {
    pages: Vec<Page>,
}

impl PageSet {
    /// Wrap pages, rejecting an empty list
    pub fn new(pages: Vec<Page>) -> Result<Self, AppError> {
        if pages.is_empty() {
            return Err(AppError::Validation("A page set cannot be empty".to_string()));
        }
        Ok(Self { pages })
    }

    /// Number of pages (at least one)
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the set has no pages (never true once constructed)
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page at `index`
    pub fn get(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// All pages in order
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
}

/// Code blocks pulled out of a response and what remains of it
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCode {
    /// `(language, body)` pairs in order of appearance
    pub blocks: Vec<(String, String)>,
    /// Input text with the fenced blocks removed
    pub residual: String,
}

/// Clean up markdown the platform renders poorly
///
/// Collapses `**`/`__` to single markers, tightens whitespace inside link
/// targets and turns `<br>` tags into newlines.
pub fn normalize(text: &str) -> String {
    let collapsed = text.replace("**", "*").replace("__", "_");
    let linked = LINK.replace_all(&collapsed, "[$1]($2)");
    LINE_BREAK.replace_all(&linked, "\n").into_owned()
}

/// Extract fenced code blocks
pub fn extract_code_blocks(text: &str) -> ExtractedCode {
    let blocks = CODE_BLOCK
        .captures_iter(text)
        .map(|caps| {
            let language = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            (language.to_string(), body.to_string())
        })
        .collect::<Vec<_>>();

    if blocks.is_empty() {
        return ExtractedCode {
            blocks,
            residual: text.to_string(),
        };
    }

    ExtractedCode {
        blocks,
        residual: CODE_BLOCK.replace_all(text, "").into_owned(),
    }
}

/// Split text into sentences, each keeping its trailing whitespace
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace. Text after
/// the last terminator forms the final sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + c.len_utf8();
        let mut saw_whitespace = false;
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            saw_whitespace = true;
            end = j + next.len_utf8();
            chars.next();
        }
        if saw_whitespace {
            sentences.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split text into chunks of at most `max_length` characters
///
/// Breaks only between sentences. A sentence longer than `max_length`
/// becomes its own oversized chunk; it is never cut. Chunks are trimmed and
/// never empty.
pub fn paginate(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if current_len + len <= max_length {
            current.push_str(sentence);
            current_len += len;
        } else {
            push_trimmed(&mut chunks, &current);
            current = sentence.to_string();
            current_len = len;
        }
    }
    push_trimmed(&mut chunks, &current);

    chunks
}

/// Truncate a value to `max_length` characters, marking the cut with `...`
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.chars().count() <= max_length {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_length.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Format a model response into its pages
///
/// Text pages come first, followed by one page per code block. Code is
/// extracted before normalization so identifiers like `__init__` survive.
pub fn build_page_set(response: &str, max_length: usize) -> PageSet {
    let extracted = extract_code_blocks(response);
    let chunks = paginate(&normalize(&extracted.residual), max_length);

    let mut pages: Vec<Page> = if chunks.len() == 1 {
        chunks
            .into_iter()
            .map(|body| Page::Text {
                title: "AI Response".to_string(),
                body,
            })
            .collect()
    } else {
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, body)| Page::Text {
                title: format!("AI Response (Part {})", i + 1),
                body,
            })
            .collect()
    };

    pages.extend(
        extracted
            .blocks
            .into_iter()
            .map(|(language, body)| Page::Code { language, body }),
    );

    if pages.is_empty() {
        pages.push(Page::Text {
            title: "AI Response".to_string(),
            body: String::new(),
        });
    }

    PageSet { pages }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_normalize_collapses_emphasis_and_breaks() {
        let text = "**bold** and __under__<br>next<BR />line";
        assert_eq!(normalize(text), "*bold* and _under_\nnext\nline");
    }

    #[test]
    fn test_normalize_leaves_well_formed_links() {
        let text = "See [the docs](https://example.com/a_b) now.";
        assert_eq!(normalize(text), text);
        assert_eq!(normalize("[x]( https://e.com )"), "[x](https://e.com)");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let text = "**very** [a](b) <br/> done";
        let once = normalize(text);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_extract_without_fences() {
        let text = "No code here. Just text.";
        let extracted = extract_code_blocks(text);
        assert!(extracted.blocks.is_empty());
        assert_eq!(extracted.residual, text);
    }

    #[test]
    fn test_extract_single_block() {
        let extracted = extract_code_blocks("```python\nprint(1)\n```");
        assert_eq!(
            extracted.blocks,
            vec![("python".to_string(), "print(1)".to_string())]
        );
        assert_eq!(extracted.residual, "");
    }

    #[test]
    fn test_extract_multiple_blocks_with_and_without_tag() {
        let text = "Intro.\n```rust\nfn main() {}\n```\nMiddle.\n```\nplain\ntext\n```\nEnd.";
        let extracted = extract_code_blocks(text);
        assert_eq!(
            extracted.blocks,
            vec![
                ("rust".to_string(), "fn main() {}".to_string()),
                (String::new(), "plain\ntext".to_string()),
            ]
        );
        assert_eq!(extracted.residual, "Intro.\n\nMiddle.\n\nEnd.");
    }

    #[test]
    fn test_paginate_fits_in_one_chunk() {
        let text = "  Hello there. How are you? Fine!  ";
        assert_eq!(paginate(text, text.len()), vec![text.trim().to_string()]);
        assert_eq!(paginate(text, 10_000), vec![text.trim().to_string()]);
    }

    #[test]
    fn test_paginate_keeps_text_without_terminator() {
        assert_eq!(paginate("no terminator here", 100), vec!["no terminator here"]);
    }

    #[test]
    fn test_paginate_breaks_at_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = paginate(text, 30);
        assert_eq!(
            chunks,
            vec!["One two three. Four five six.", "Seven eight nine."]
        );
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
    }

    #[test]
    fn test_paginate_oversized_sentence_is_not_split() {
        let long = "This sentence is definitely longer than the limit.";
        let text = format!("Short. {} Tail.", long);
        let chunks = paginate(&text, 20);
        assert_eq!(chunks, vec!["Short.", long, "Tail."]);
    }

    #[test]
    fn test_paginate_reconstructs_sentences_in_order() {
        let text = "Alpha is first. Beta follows!\nGamma asks why? Delta ends it. Epsilon trails";
        for max_length in [1, 10, 20, 35, 80] {
            let chunks = paginate(text, max_length);
            assert!(chunks.iter().all(|c| !c.is_empty()));
            assert_eq!(
                collapse_whitespace(&chunks.join(" ")),
                collapse_whitespace(text)
            );
        }
    }

    #[test]
    fn test_paginate_counts_characters_not_bytes() {
        // 10 characters, 20+ bytes
        let text = "ééééééééé.";
        assert_eq!(paginate(text, 10).len(), 1);
    }

    #[test]
    fn test_paginate_whitespace_only() {
        assert!(paginate("   \n\t ", 10).is_empty());
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("short", 10), "short");
        assert_eq!(truncate_field("abcdefghijk", 8), "abcde...");
    }

    #[test]
    fn test_build_page_set_orders_text_then_code() {
        let response = "Here you go.\n```python\nprint(1)\n```\n**Done**.";
        let pages = build_page_set(response, 2048);
        assert_eq!(pages.len(), 2);
        assert_eq!(
            pages.get(0),
            Some(&Page::Text {
                title: "AI Response".to_string(),
                body: "Here you go.\n\n*Done*.".to_string(),
            })
        );
        assert_eq!(pages.get(1).map(Page::title), Some("Code Block (python)".to_string()));
    }

    #[test]
    fn test_build_page_set_keeps_code_untouched() {
        let response = "```python\nclass A:\n    def __init__(self): pass\n```";
        let pages = build_page_set(response, 2048);
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages.get(0),
            Some(&Page::Code {
                language: "python".to_string(),
                body: "class A:\n    def __init__(self): pass".to_string(),
            })
        );
    }

    #[test]
    fn test_build_page_set_numbers_parts() {
        let pages = build_page_set("First part here. Second part here.", 20);
        let titles: Vec<String> = pages.pages().iter().map(Page::title).collect();
        assert_eq!(titles, vec!["AI Response (Part 1)", "AI Response (Part 2)"]);
    }

    #[test]
    fn test_build_page_set_never_empty() {
        let pages = build_page_set("   ", 2048);
        assert_eq!(pages.len(), 1);
        assert!(PageSet::new(Vec::new()).is_err());
    }
}
