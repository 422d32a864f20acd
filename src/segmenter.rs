//! Response segmentation
//!
//! Splits raw model output into a rationale and a final answer. Model output
//! format is not guaranteed, so this never fails: explicit section markers win,
//! then paragraph splitting, then the whole text becomes the answer.

/// Section markers in priority order. A marker only counts at the start of a line.
pub const SECTION_MARKERS: &[&str] = &[
    "Final Answer:",
    "Response:",
    "Answer:",
    "Decision:",
    "Action:",
    "JSON:",
];

/// Rationale used when the output has no separable reasoning.
pub const NO_RATIONALE: &str = "Direct decision without detailed external thinking.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub rationale: String,
    pub final_answer: String,
}

/// Split `text` into (rationale, final answer).
pub fn segment(text: &str) -> Segments {
    for marker in SECTION_MARKERS {
        if let Some(idx) = find_at_line_start(text, marker) {
            return Segments {
                rationale: text[..idx].trim().to_string(),
                final_answer: text[idx + marker.len()..].trim().to_string(),
            };
        }
    }

    let normalized = text.replace("\r\n", "\n");
    let paragraphs: Vec<&str> = normalized
        .trim()
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    if let Some((last, earlier)) = paragraphs.split_last() {
        if !earlier.is_empty() {
            return Segments {
                rationale: earlier.join("\n\n").trim().to_string(),
                final_answer: last.trim().to_string(),
            };
        }
    }

    Segments {
        rationale: NO_RATIONALE.to_string(),
        final_answer: text.trim().to_string(),
    }
}

/// First occurrence of `marker` that begins a line (ignoring indentation).
fn find_at_line_start(text: &str, marker: &str) -> Option<usize> {
    text.match_indices(marker).map(|(idx, _)| idx).find(|&idx| {
        let before = text[..idx].trim_end_matches(|c: char| c == ' ' || c == '\t');
        before.is_empty() || before.ends_with('\n')
    })
}
