// src/engine/format.rs
//! Final text rendering: purely derived from the allocator's output.

use crate::engine::budget::Selection;

/// Deterministic separator between selected blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Concatenate the rendered text of included entries in selection order.
pub fn format_selection(selection: &Selection) -> String {
    selection
        .entries
        .iter()
        .filter(|e| e.included)
        .map(|e| e.candidate.text.as_str())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
