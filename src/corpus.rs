//! Message corpus parsing.
//!
//! A corpus is the ordered, immutable list of messages every channel cycles
//! through. Input is either a text file or an inline argument string:
//!
//! 1. A file may use the line-structured form: one JSON string literal per
//!    non-blank line (embedded `\n` escapes carry multi-line content). This
//!    form applies only if every line decodes; no separator splitting runs.
//! 2. Anything else is a single block, split only on an explicit `&` or the
//!    whole word `and`. Newlines inside a fragment survive untouched, which
//!    is what keeps ASCII-art blocks intact as one message.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::error::CorpusError;

/// File extensions eligible for the line-structured form.
const CORPUS_EXTENSIONS: &[&str] = &["txt", "text", "jsonl"];

/// Characters operators paste that visually resemble `&` and are meant as
/// separators. Normalized before splitting.
const AMPERSAND_LOOKALIKES: &[char] = &['﹠', '＆', '⅋', 'ꓸ', '︔'];

/// Parsed, ordered message corpus. Non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCorpus {
    messages: Vec<String>,
}

impl MessageCorpus {
    /// Parse operator input into a corpus.
    ///
    /// If `input` names an existing file with a recognized extension, the
    /// file content is parsed (line-structured form first, block form as
    /// fallback). Otherwise `input` itself is parsed as a block.
    pub fn parse(input: &str) -> Result<Self, CorpusError> {
        let path = Path::new(input);
        let is_corpus_file = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| CORPUS_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

        let messages = if is_corpus_file {
            let content =
                std::fs::read_to_string(path).map_err(|source| CorpusError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?;
            match decode_json_lines(&content) {
                Some(messages) => messages,
                None => split_block(&content),
            }
        } else {
            split_block(input)
        };

        if messages.is_empty() {
            return Err(CorpusError::NoMessages);
        }
        tracing::debug!(count = messages.len(), "parsed message corpus");
        Ok(Self { messages })
    }

    /// Number of messages. Always at least 1.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message at a cursor position, wrapping modulo corpus length.
    pub fn message(&self, cursor: usize) -> &str {
        &self.messages[cursor % self.messages.len()]
    }

    /// The cursor position following `cursor`, wrapping to 0 at the end.
    pub fn next_index(&self, cursor: usize) -> usize {
        (cursor + 1) % self.messages.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Wrap in an [`Arc`] for sharing across dispatch loops.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Line-structured form: every non-blank line must be a JSON string literal.
///
/// Returns `None` when any line fails to decode or no message results, in
/// which case the caller falls back to block parsing.
fn decode_json_lines(content: &str) -> Option<Vec<String>> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let mut messages = Vec::with_capacity(lines.len());
    for line in lines {
        match serde_json::from_str::<String>(line) {
            Ok(message) => messages.push(message),
            Err(_) => return None,
        }
    }
    Some(messages)
}

/// Block form: normalize ampersand lookalikes, split on explicit separators
/// only, trim fragments, and drop the empty ones.
fn split_block(content: &str) -> Vec<String> {
    let normalized: String = content
        .chars()
        .map(|c| if AMPERSAND_LOOKALIKES.contains(&c) { '&' } else { c })
        .collect();

    // `&` or the standalone word `and`, optionally surrounded by whitespace.
    let separator = Regex::new(r"(?i)\s*(?:&|\band\b)\s*").expect("valid separator regex");

    separator
        .split(&normalized)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
