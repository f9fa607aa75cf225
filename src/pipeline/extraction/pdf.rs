//! Native text layer with positions, read straight from page content streams.
//!
//! Walks the text operators of each page (BT, Tf, Tm, Td, TD, T*, TL, Tj, TJ,
//! ', ") tracking the text and line matrices, then groups the shown strings
//! into lines by baseline.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use super::sanitize::normalize_line;
use super::types::{PageText, PdfTextLayer, PositionedLine};
use super::ExtractError;

/// Baselines closer than this (points) belong to the same line.
const Y_TOLERANCE: f32 = 2.0;

/// Glyph width as a fraction of font size when no metrics are available.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// TJ displacement (thousandths of an em) wider than this becomes a space.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

const IDENTITY_MATRIX: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Default US-Letter media box when a page does not declare one.
const DEFAULT_MEDIA_BOX: (f32, f32) = (612.0, 792.0);

/// Text-layer extractor backed by lopdf.
pub struct LopdfTextLayer;

impl PdfTextLayer for LopdfTextLayer {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
        let doc = load_document(pdf_bytes)?;

        let mut pages = Vec::new();
        for (page_no, page_id) in doc.get_pages() {
            let (width, height) = media_box(&doc, page_id);
            let lines = match page_spans(&doc, page_id) {
                Ok(spans) => group_spans_into_lines(spans, height),
                Err(e) => {
                    // An unreadable content stream leaves the page to OCR.
                    tracing::warn!(page = page_no, error = %e, "Text layer unreadable");
                    Vec::new()
                }
            };
            pages.push(PageText {
                page_no,
                width,
                height,
                lines,
            });
        }
        Ok(pages)
    }
}

/// Open a PDF, rejecting anything that is not a PDF container with pages.
pub fn load_document(pdf_bytes: &[u8]) -> Result<Document, ExtractError> {
    let head = &pdf_bytes[..pdf_bytes.len().min(1024)];
    if !head.windows(5).any(|w| w == b"%PDF-") {
        return Err(ExtractError::InvalidFormat("missing %PDF- header".into()));
    }

    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractError::InvalidFormat(e.to_string()))?;
    if doc.get_pages().is_empty() {
        return Err(ExtractError::InvalidFormat("document has no pages".into()));
    }
    Ok(doc)
}

/// Page size from /MediaBox, looked up through the page tree.
fn media_box(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    // Inherited attributes: walk /Parent links, bounded to avoid cycles.
    for _ in 0..32 {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else { break };
        if let Ok(obj) = dict.get(b"MediaBox") {
            let resolved = match obj {
                Object::Reference(r) => doc.get_object(*r).unwrap_or(obj),
                other => other,
            };
            if let Ok(values) = resolved.as_array() {
                let nums: Vec<f32> = values.iter().filter_map(number).collect();
                if nums.len() == 4 {
                    return ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
                }
            }
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    DEFAULT_MEDIA_BOX
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Text-state machine
// ---------------------------------------------------------------------------

/// A run of text shown at one position, in PDF user space (y up).
#[derive(Debug, Clone)]
struct TextSpan {
    text: String,
    x: f32,
    y: f32,
    width: f32,
    font_size: f32,
}

#[derive(Debug, Clone)]
struct TextState {
    font_size: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }
}

impl TextState {
    /// Rendered size: font size scaled by the matrix's vertical component.
    fn effective_font_size(&self) -> f32 {
        let scale = (self.text_matrix[1].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix[4] = m[0] * tx + m[2] * ty + m[4];
        self.line_matrix[5] = m[1] * tx + m[3] * ty + m[5];
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, text: &str) -> f32 {
        let mut dx = 0.0;
        for ch in text.chars() {
            dx += self.font_size * APPROX_CHAR_WIDTH_RATIO + self.char_spacing;
            if ch == ' ' {
                dx += self.word_spacing;
            }
        }
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
        dx * self.text_matrix[0].abs().max(f32::EPSILON)
    }

    fn show(&mut self, text: String, spans: &mut Vec<TextSpan>) {
        if text.is_empty() {
            return;
        }
        let x = self.text_matrix[4];
        let y = self.text_matrix[5];
        let font_size = self.effective_font_size();
        let width = self.advance(&text);
        spans.push(TextSpan {
            text,
            x,
            y,
            width,
            font_size,
        });
    }
}

fn page_spans(doc: &Document, page_id: ObjectId) -> Result<Vec<TextSpan>, ExtractError> {
    let raw = doc
        .get_page_content(page_id)
        .map_err(|e| ExtractError::PdfParsing(format!("cannot read page content: {e}")))?;
    let content = Content::decode(&raw)
        .map_err(|e| ExtractError::PdfParsing(format!("content stream decode error: {e}")))?;

    let mut state = TextState::default();
    let mut spans = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);
        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = IDENTITY_MATRIX;
                state.line_matrix = IDENTITY_MATRIX;
            }
            "Tf" => {
                if let Some(size) = num(1) {
                    state.font_size = size;
                }
            }
            "Tm" => {
                if operands.len() >= 6 {
                    let mut m = IDENTITY_MATRIX;
                    for (i, slot) in m.iter_mut().enumerate() {
                        *slot = num(i).unwrap_or(*slot);
                    }
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.translate_line(0.0, -state.leading),
            "TL" => {
                if let Some(v) = num(0) {
                    state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = num(0) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = num(0) {
                    state.word_spacing = v;
                }
            }
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, &mut spans);
                }
            }
            "'" => {
                state.translate_line(0.0, -state.leading);
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.show(text, &mut spans);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    state.word_spacing = aw;
                    state.char_spacing = ac;
                }
                state.translate_line(0.0, -state.leading);
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    state.show(text, &mut spans);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut buffer = String::new();
                    for item in items {
                        match item {
                            Object::String(..) => {
                                if let Some(text) = string_operand(item) {
                                    buffer.push_str(&text);
                                }
                            }
                            other => {
                                if let Some(adjust) = number(other) {
                                    if -adjust > TJ_SPACE_THRESHOLD && !buffer.ends_with(' ') {
                                        buffer.push(' ');
                                    }
                                }
                            }
                        }
                    }
                    state.show(buffer, &mut spans);
                }
            }
            _ => {}
        }
    }

    Ok(spans)
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text_simple(bytes)),
        _ => None,
    }
}

/// Best-effort decoding of PDF string bytes: UTF-16BE with BOM, UTF-8, then Latin-1.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// Line grouping
// ---------------------------------------------------------------------------

/// Group spans sharing a baseline into lines, top of page first.
///
/// `page_height` converts PDF y (up from the bottom) into `top` (down from the top).
fn group_spans_into_lines(mut spans: Vec<TextSpan>, page_height: f32) -> Vec<PositionedLine> {
    spans.retain(|s| !s.text.trim().is_empty());
    spans.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut groups: Vec<Vec<TextSpan>> = Vec::new();
    for span in spans {
        match groups.last_mut() {
            Some(group) if (group[0].y - span.y).abs() <= Y_TOLERANCE => group.push(span),
            _ => groups.push(vec![span]),
        }
    }

    groups
        .into_iter()
        .filter_map(|group| assemble_line(group, page_height))
        .collect()
}

fn assemble_line(mut spans: Vec<TextSpan>, page_height: f32) -> Option<PositionedLine> {
    spans.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut text = String::new();
    let mut prev_end: Option<f32> = None;
    for span in &spans {
        if let Some(end) = prev_end {
            let gap = span.x - end;
            if gap > span.font_size * 0.2 && !text.ends_with(' ') {
                text.push(' ');
            }
        }
        text.push_str(&span.text);
        prev_end = Some(span.x + span.width);
    }

    let text = normalize_line(&text);
    if text.is_empty() {
        return None;
    }

    let first = spans.first()?;
    let x = first.x;
    let right = spans
        .iter()
        .map(|s| s.x + s.width)
        .fold(x, f32::max);
    let font_size = spans.iter().map(|s| s.font_size).fold(0.0, f32::max).max(1.0);
    let baseline = spans.iter().map(|s| s.y).fold(f32::MIN, f32::max);

    Some(PositionedLine {
        text,
        x,
        top: (page_height - baseline - font_size).max(0.0),
        width: right - x,
        height: font_size,
    })
}
