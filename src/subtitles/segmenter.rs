/// Transcript segmentation
///
/// Folds caption records into sentence-level rows. A row closes when the
/// speaker style changes or when a cue ends in terminal punctuation.
use super::{CaptionRecord, TranscriptRow};

/// Cues containing this marker are broadcast jingles, not speech
pub const GONG_MARKER: &str = "* Gong *";

const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Segment caption records using the default behavior
pub fn segment(records: &[CaptionRecord]) -> Vec<TranscriptRow> {
    Segmenter::default().segment(records)
}

/// Transcript segmenter
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter {
    /// Emit the unterminated fragment left at end of stream instead of dropping it
    pub flush_trailing: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailing_flush(mut self, flush: bool) -> Self {
        self.flush_trailing = flush;
        self
    }

    /// Run the fold over `records` and clean up the emitted rows
    pub fn segment(&self, records: &[CaptionRecord]) -> Vec<TranscriptRow> {
        let mut rows = Vec::new();
        let mut acc = Accumulator::default();

        for record in records {
            if record.text.contains(GONG_MARKER) {
                continue;
            }

            if record.style_tag != acc.style_tag {
                rows.push(acc.to_row());
                acc = Accumulator::from_record(record);
            } else if ends_sentence(&record.text) {
                acc.append(record);
                rows.push(acc.to_row());
                acc = Accumulator::default();
            } else {
                acc.append(record);
            }
        }

        if self.flush_trailing {
            rows.push(acc.to_row());
        }

        rows.into_iter()
            .filter(|row| !row.text.is_empty())
            .map(|mut row| {
                // One pass only: runs of three or more spaces keep a double space
                row.text = row.text.replace("  ", " ");
                row
            })
            .collect()
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim().ends_with(SENTENCE_TERMINATORS)
}

/// The open row of the fold
#[derive(Debug, Default)]
struct Accumulator {
    text: String,
    style_tag: String,
    start: String,
    end: String,
}

impl Accumulator {
    fn from_record(record: &CaptionRecord) -> Self {
        Self {
            text: record.text.clone(),
            style_tag: record.style_tag.clone(),
            start: record.start.clone(),
            end: record.end.clone(),
        }
    }

    fn append(&mut self, record: &CaptionRecord) {
        self.text.push(' ');
        self.text.push_str(&record.text);
        self.end.clone_from(&record.end);
    }

    fn to_row(&self) -> TranscriptRow {
        TranscriptRow {
            text: self.text.trim().to_string(),
            style_tag: self.style_tag.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }
}
