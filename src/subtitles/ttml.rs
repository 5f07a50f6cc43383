/// TTML subtitle decoder
///
/// Streams a timed-text document with `quick-xml` and emits one
/// [`CaptionRecord`] per `tt:p` element, in document order.
use super::CaptionRecord;
use crate::error::{Result, ScraperError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::encoding::Decoder;
use quick_xml::NsReader;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Namespace of the elements the decoder looks at
pub const TTML_NAMESPACE: &[u8] = b"http://www.w3.org/ns/ttml";

/// Decode a TTML document held in memory
///
/// The text is already UTF-8, so any `encoding` in the XML declaration is
/// ignored.
pub fn decode(document: &str) -> Result<Vec<CaptionRecord>> {
    read_document(NsReader::from_str(document))
}

/// Decode a TTML document from raw bytes
///
/// The encoding comes from the byte order mark or the XML declaration and
/// defaults to UTF-8. Bytes that are invalid in that encoding make the
/// document malformed.
pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<CaptionRecord>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    read_document(NsReader::from_reader(bytes))
}

fn read_document(mut reader: NsReader<&[u8]>) -> Result<Vec<CaptionRecord>> {
    let mut parser = TtmlParser::default();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ScraperError::MalformedDocument(e.to_string()))?;
        let in_ttml = match ns {
            ResolveResult::Bound(Namespace(uri)) => uri == TTML_NAMESPACE,
            ResolveResult::Unbound => false,
            ResolveResult::Unknown(prefix) => {
                return Err(ScraperError::MalformedDocument(format!(
                    "undeclared namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                )));
            }
        };
        let decoder = reader.decoder();

        match event {
            Event::Start(ref e) => parser.handle_start(e, decoder, in_ttml, false)?,
            Event::Empty(ref e) => parser.handle_start(e, decoder, in_ttml, true)?,
            Event::End(_) => parser.handle_end(),
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| ScraperError::MalformedDocument(err.to_string()))?;
                parser.handle_text(&text)?;
            }
            Event::CData(ref e) => {
                let text = decoder
                    .decode(e)
                    .map_err(|err| ScraperError::MalformedDocument(err.to_string()))?;
                parser.handle_text(&text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let records = parser.finish()?;
    debug!("Decoded {} caption records", records.len());
    Ok(records)
}

/// Read and decode a stored TTML file
pub async fn decode_file<P: AsRef<Path>>(path: P) -> Result<Vec<CaptionRecord>> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    decode_bytes(&bytes)
}

/// A paragraph being assembled while its content streams past
#[derive(Debug, Default)]
struct ParagraphDraft {
    begin: String,
    end: String,
    text: String,
    style_refs: Vec<String>,
}

/// An open `tt:span` whose leading text is still being collected
#[derive(Debug, Default)]
struct OpenSpan {
    leading_text: Option<String>,
    style_ref: Option<String>,
    closed_text: bool,
}

#[derive(Debug)]
enum OpenElement {
    Paragraph,
    Span(usize),
    Other,
}

/// Streaming state for one document
#[derive(Debug, Default)]
struct TtmlParser {
    style_ids: HashSet<String>,
    paragraphs: Vec<ParagraphDraft>,
    open_paragraphs: Vec<usize>,
    spans: Vec<OpenSpan>,
    stack: Vec<OpenElement>,
    root_seen: bool,
}

impl TtmlParser {
    fn handle_start(&mut self, e: &BytesStart<'_>, decoder: Decoder, in_ttml: bool, is_empty: bool) -> Result<()> {
        if self.stack.is_empty() {
            if self.root_seen {
                return Err(ScraperError::MalformedDocument(
                    "content after the root element".to_string(),
                ));
            }
            self.root_seen = true;
        }

        // Any child element ends the leading text of the enclosing span
        self.close_span_text();

        let local = e.local_name();
        let element = match (in_ttml, local.as_ref()) {
            (true, b"p") => {
                let (begin, end) = paragraph_timing(e, decoder, self.paragraphs.len())?;
                self.paragraphs.push(ParagraphDraft {
                    begin,
                    end,
                    ..Default::default()
                });
                self.open_paragraphs.push(self.paragraphs.len() - 1);
                OpenElement::Paragraph
            }
            (true, b"span") => {
                self.spans.push(OpenSpan {
                    style_ref: attribute(e, decoder, b"style")?,
                    ..Default::default()
                });
                OpenElement::Span(self.spans.len() - 1)
            }
            (true, b"style") => {
                if let Some(id) = attribute(e, decoder, b"xml:id")? {
                    self.style_ids.insert(id);
                }
                OpenElement::Other
            }
            _ => OpenElement::Other,
        };

        self.stack.push(element);
        if is_empty {
            self.handle_end();
        }
        Ok(())
    }

    fn handle_end(&mut self) {
        self.close_span_text();
        match self.stack.pop() {
            Some(OpenElement::Paragraph) => {
                self.open_paragraphs.pop();
            }
            Some(OpenElement::Span(_)) => {
                self.spans.pop();
            }
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) -> Result<()> {
        match self.stack.last() {
            None => {
                if !text.trim().is_empty() {
                    return Err(ScraperError::MalformedDocument(
                        "text outside the root element".to_string(),
                    ));
                }
            }
            Some(OpenElement::Span(index)) => {
                let span = &mut self.spans[*index];
                if !span.closed_text && !text.is_empty() {
                    span.leading_text.get_or_insert_with(String::new).push_str(text);
                }
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Hand the innermost span's leading text to every open paragraph
    fn close_span_text(&mut self) {
        let Some(OpenElement::Span(index)) = self.stack.last() else {
            return;
        };
        let span = &mut self.spans[*index];
        if span.closed_text {
            return;
        }
        span.closed_text = true;

        let Some(text) = span.leading_text.take() else {
            return;
        };
        for &paragraph in &self.open_paragraphs {
            let draft = &mut self.paragraphs[paragraph];
            draft.text.push(' ');
            draft.text.push_str(&text);
            if let Some(style_ref) = &span.style_ref {
                draft.style_refs.push(style_ref.clone());
            }
        }
    }

    fn finish(self) -> Result<Vec<CaptionRecord>> {
        if !self.root_seen {
            return Err(ScraperError::MalformedDocument(
                "document has no root element".to_string(),
            ));
        }
        if !self.stack.is_empty() {
            return Err(ScraperError::MalformedDocument(format!(
                "{} element(s) left unclosed",
                self.stack.len()
            )));
        }

        let style_ids = self.style_ids;
        Ok(self
            .paragraphs
            .into_iter()
            .map(|draft| {
                let style_tag = draft
                    .style_refs
                    .into_iter()
                    .find(|style_ref| style_ids.contains(style_ref))
                    .unwrap_or_default();
                CaptionRecord {
                    text: draft.text,
                    style_tag,
                    start: draft.begin,
                    end: draft.end,
                }
            })
            .collect())
    }
}

fn attribute(e: &BytesStart<'_>, decoder: Decoder, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ScraperError::MalformedDocument(err.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(|err| ScraperError::MalformedDocument(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn paragraph_timing(e: &BytesStart<'_>, decoder: Decoder, index: usize) -> Result<(String, String)> {
    let begin = attribute(e, decoder, b"begin")?.ok_or_else(|| {
        ScraperError::MalformedDocument(format!("paragraph {} has no begin attribute", index + 1))
    })?;
    let end = attribute(e, decoder, b"end")?.ok_or_else(|| {
        ScraperError::MalformedDocument(format!("paragraph {} has no end attribute", index + 1))
    })?;
    Ok((begin, end))
}
