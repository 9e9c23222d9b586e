//! Context assembly: one citation-keyed line per passage.

use groundchat_core::search::Passage;
use serde::{Deserialize, Serialize};

/// Separator standing in for line breaks and between captions.
const LINE_SEPARATOR: &str = " . ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// All lines joined with `\n`
    pub block: String,
    /// The same lines, kept for citations
    pub data_points: Vec<String>,
}

/// Replace `\r\n`, `\n` and `\r` with a visible separator.
pub fn nonewlines(text: &str) -> String {
    text.replace("\r\n", LINE_SEPARATOR)
        .replace(['\n', '\r'], LINE_SEPARATOR)
}

/// Format passages as `"{source_id}: {text}"` lines, in retrieval order.
///
/// With `use_captions`, the text is the passage's captions joined by
/// `" . "`; passages without captions fall back to their content.
pub fn assemble(passages: &[Passage], use_captions: bool) -> AssembledContext {
    let data_points: Vec<String> = passages
        .iter()
        .map(|p| {
            let text = match (&p.captions, use_captions) {
                (Some(captions), true) => captions.join(LINE_SEPARATOR),
                _ => p.content.clone(),
            };
            format!("{}: {}", p.source_id, nonewlines(&text))
        })
        .collect();

    AssembledContext {
        block: data_points.join("\n"),
        data_points,
    }
}
