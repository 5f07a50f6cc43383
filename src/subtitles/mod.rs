/// Subtitle decoding and transcript segmentation
///
/// Raw TTML documents are decoded into paragraph-level caption records, which
/// the segmenter then folds into sentence-level transcript rows.

pub mod ttml;
pub mod segmenter;

// Re-export main types
pub use ttml::{decode, decode_file};
pub use segmenter::{segment, Segmenter};

use serde::{Deserialize, Serialize};

/// One paragraph-level subtitle cue, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Concatenated span text; may carry leading whitespace or be empty
    pub text: String,
    /// Identifier of the resolved style, empty when none applies
    #[serde(rename = "color")]
    pub style_tag: String,
    /// Begin timecode, verbatim
    #[serde(rename = "start_time")]
    pub start: String,
    /// End timecode, verbatim
    #[serde(rename = "end_time")]
    pub end: String,
}

impl CaptionRecord {
    pub fn new(
        text: impl Into<String>,
        style_tag: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            style_tag: style_tag.into(),
            start: start.into(),
            end: end.into(),
        }
    }
}

/// One segmented utterance as persisted to `subtitles/{permanent_id}.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub text: String,
    #[serde(rename = "color")]
    pub style_tag: String,
    #[serde(rename = "start_time")]
    pub start: String,
    #[serde(rename = "end_time")]
    pub end: String,
}

impl crate::artifacts::TableRow for TranscriptRow {
    const HEADERS: &'static [&'static str] = &["text", "color", "start_time", "end_time"];
}
