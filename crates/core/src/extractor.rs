use crate::config::LayoutOptions;
use crate::error::ExtractError;
use crate::layout::{
    group_runs_into_lines, merge_hyphenated_lines, normalize_whitespace,
    remove_repeated_headers_footers,
};
use crate::pages::tag_pages;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A string shown by one text operator, positioned at the text matrix origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// Set when the content stream moved explicitly to the next line after this run.
    pub ends_line: bool,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            ends_line: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageRuns {
    /// Pages in the source document, before any page cap.
    pub total_pages: usize,
    pub pages: Vec<Vec<TextRun>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedDocument {
    pub page_texts: Vec<String>,
    pub full_text: String,
    pub page_count: usize,
}

pub trait PdfExtractor {
    fn extract_runs(&self, bytes: &[u8], max_pages: Option<usize>) -> Result<PageRuns, ExtractError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_runs(&self, bytes: &[u8], max_pages: Option<usize>) -> Result<PageRuns, ExtractError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractError::PdfParse(error.to_string()))?;

        let pages = document.get_pages();
        let total_pages = pages.len();
        let take = max_pages.map_or(total_pages, |cap| cap.min(total_pages));

        let mut result = Vec::with_capacity(take);
        for (page_no, page_id) in pages.into_iter().take(take) {
            let runs = match document.get_page_content(page_id) {
                Ok(content) => match Content::decode(&content) {
                    Ok(content) => {
                        runs_from_operations(&content.operations, &page_fonts(&document, page_id))
                    }
                    Err(error) => {
                        debug!(page = page_no, %error, "undecodable content stream, page left empty");
                        Vec::new()
                    }
                },
                Err(error) => {
                    debug!(page = page_no, %error, "page has no content stream");
                    Vec::new()
                }
            };
            result.push(runs);
        }

        Ok(PageRuns {
            total_pages,
            pages: result,
        })
    }
}

/// Runs extraction, layout cleanup and page tagging over raw PDF bytes.
pub fn extract_document<E: PdfExtractor + ?Sized>(
    extractor: &E,
    bytes: &[u8],
    max_pages: Option<usize>,
    layout: &LayoutOptions,
) -> Result<ExtractedDocument, ExtractError> {
    let runs = extractor.extract_runs(bytes, max_pages)?;
    Ok(document_from_runs(runs, layout))
}

pub fn document_from_runs(runs: PageRuns, layout: &LayoutOptions) -> ExtractedDocument {
    let raw_pages = runs
        .pages
        .iter()
        .map(|page| {
            group_runs_into_lines(page, layout.line_merge_threshold)
                .iter()
                .map(|line| normalize_whitespace(line))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let page_texts = remove_repeated_headers_footers(raw_pages, layout)
        .iter()
        .map(|lines| merge_hyphenated_lines(lines).join("\n"))
        .collect::<Vec<_>>();

    ExtractedDocument {
        full_text: tag_pages(&page_texts),
        page_count: runs.total_pages.max(page_texts.len()),
        page_texts,
    }
}

const BASE_ENCODINGS: [&str; 4] = [
    "StandardEncoding",
    "MacRomanEncoding",
    "MacExpertEncoding",
    "WinAnsiEncoding",
];

// Wider bfrange entries are malformed.
const MAX_BFRANGE: u32 = 0xFFFF;

pub(crate) type PageFonts = BTreeMap<Vec<u8>, FontDecoder>;

/// How a font resource maps string bytes to text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FontDecoder {
    /// Single-byte font with a named base encoding.
    Encoded(String),
    /// Simple font without a usable encoding entry.
    Builtin,
    /// Codes mapped through the font's ToUnicode CMap.
    Cmap(ToUnicodeMap),
    /// Composite font without a ToUnicode map. Its codes are glyph ids.
    Opaque,
}

impl FontDecoder {
    fn for_font(document: &Document, font: &Dictionary) -> Self {
        if let Some(map) = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|object| ToUnicodeMap::load(document, object))
        {
            return Self::Cmap(map);
        }
        if font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice()) {
            return Self::Opaque;
        }
        match base_encoding(document, font) {
            Some(encoding) if BASE_ENCODINGS.contains(&encoding.as_str()) => Self::Encoded(encoding),
            _ => Self::Builtin,
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Encoded(encoding) => clean_text(Document::decode_text(Some(encoding.as_str()), bytes)),
            Self::Builtin => decode_pdf_string(bytes),
            Self::Cmap(map) => clean_text(map.decode(bytes)),
            Self::Opaque => None,
        }
    }
}

fn page_fonts(document: &Document, page_id: ObjectId) -> PageFonts {
    document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, FontDecoder::for_font(document, font)))
        .collect()
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn base_encoding(document: &Document, font: &Dictionary) -> Option<String> {
    let name = match resolve(document, font.get(b"Encoding").ok()?) {
        Object::Name(name) => name.as_slice(),
        Object::Dictionary(encoding) => encoding.get(b"BaseEncoding").and_then(Object::as_name).ok()?,
        _ => return None,
    };
    String::from_utf8(name.to_vec()).ok()
}

/// Source codes to Unicode text, read from a ToUnicode CMap stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ToUnicodeMap {
    code_len: usize,
    codes: HashMap<u32, String>,
}

impl ToUnicodeMap {
    fn load(document: &Document, object: &Object) -> Option<Self> {
        let stream = resolve(document, object).as_stream().ok()?;
        let data = if stream.dict.get(b"Filter").is_ok() {
            stream.decompressed_content().ok()?
        } else {
            stream.content.clone()
        };
        let content = Content::decode(&data).ok()?;
        let map = Self::from_operations(&content.operations);
        (!map.codes.is_empty()).then_some(map)
    }

    /// CMap syntax parses as content operations: every `end*` operator
    /// carries the entries of its section as operands.
    pub(crate) fn from_operations(operations: &[Operation]) -> Self {
        let mut map = Self::default();
        for op in operations {
            match op.operator.as_str() {
                "endcodespacerange" => {
                    if let Some(Object::String(low, _)) = op.operands.first() {
                        map.code_len = low.len();
                    }
                }
                "endbfchar" => {
                    for pair in op.operands.chunks_exact(2) {
                        if let (Object::String(code, _), Object::String(target, _)) = (&pair[0], &pair[1]) {
                            map.note_code_len(code.len());
                            map.codes.insert(code_value(code), utf16_text(target, 0));
                        }
                    }
                }
                "endbfrange" => {
                    for entry in op.operands.chunks_exact(3) {
                        map.insert_range(&entry[0], &entry[1], &entry[2]);
                    }
                }
                _ => {}
            }
        }
        if map.code_len == 0 {
            map.code_len = 2;
        }
        map
    }

    fn insert_range(&mut self, low: &Object, high: &Object, target: &Object) {
        let (Object::String(low, _), Object::String(high, _)) = (low, high) else {
            return;
        };
        self.note_code_len(low.len());
        let (first, last) = (code_value(low), code_value(high));
        if last < first || last - first > MAX_BFRANGE {
            return;
        }
        match target {
            Object::String(start, _) => {
                for offset in 0..=(last - first) {
                    self.codes.insert(first + offset, utf16_text(start, offset));
                }
            }
            Object::Array(targets) => {
                for (offset, target) in (0..=(last - first)).zip(targets) {
                    if let Object::String(target, _) = target {
                        self.codes.insert(first + offset, utf16_text(target, 0));
                    }
                }
            }
            _ => {}
        }
    }

    fn note_code_len(&mut self, len: usize) {
        if self.code_len == 0 {
            self.code_len = len;
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_len.max(1))
            .filter_map(|code| self.codes.get(&code_value(code)))
            .map(String::as_str)
            .collect()
    }
}

fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0, |value, byte| (value << 8) | u32::from(*byte))
}

/// UTF-16BE target text, with `offset` added to its last code unit.
fn utf16_text(bytes: &[u8], offset: u32) -> String {
    let mut units = bytes
        .chunks(2)
        .map(|pair| match pair {
            [high, low] => u16::from_be_bytes([*high, *low]),
            [low] => u16::from(*low),
            _ => 0,
        })
        .collect::<Vec<_>>();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

// TJ adjustments are in thousandths of text space; a gap this wide reads as a word break.
const TJ_WORD_GAP: f32 = -200.0;

struct TextState {
    matrix: [f32; 6],
    line_matrix: [f32; 6],
    leading: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
        }
    }

    fn begin(&mut self) {
        self.matrix = IDENTITY;
        self.line_matrix = IDENTITY;
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let [a, b, c, d, e, f] = self.line_matrix;
        self.line_matrix = [a, b, c, d, tx * a + ty * c + e, tx * b + ty * d + f];
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    fn set_matrix(&mut self, values: [f32; 6]) {
        self.matrix = values;
        self.line_matrix = values;
    }

    fn origin(&self) -> (f32, f32) {
        (self.matrix[4], self.matrix[5])
    }
}

pub(crate) fn runs_from_operations(operations: &[Operation], fonts: &PageFonts) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    let mut state = TextState::new();
    let mut font: Option<&FontDecoder> = None;

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => state.begin(),
            "Tf" => {
                font = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| fonts.get(name));
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (operand(operands, 0), operand(operands, 1)) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "Tm" => {
                let values = (0..6).map(|i| operand(operands, i)).collect::<Option<Vec<_>>>();
                if let Some(values) = values {
                    state.set_matrix([values[0], values[1], values[2], values[3], values[4], values[5]]);
                }
            }
            "T*" => {
                mark_line_end(&mut runs);
                state.next_line();
            }
            "Tj" => {
                if let Some(text) = operands.first().and_then(|object| string_operand(object, font)) {
                    push_run(&mut runs, text, &state);
                }
            }
            "'" => {
                mark_line_end(&mut runs);
                state.next_line();
                if let Some(text) = operands.first().and_then(|object| string_operand(object, font)) {
                    push_run(&mut runs, text, &state);
                }
            }
            "\"" => {
                mark_line_end(&mut runs);
                state.next_line();
                if let Some(text) = operands.get(2).and_then(|object| string_operand(object, font)) {
                    push_run(&mut runs, text, &state);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut text = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                if let Some(decoded) = decode_with(font, bytes) {
                                    text.push_str(&decoded);
                                }
                            }
                            other => {
                                if number(other).is_some_and(|gap| gap < TJ_WORD_GAP) {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                    push_run(&mut runs, text, &state);
                }
            }
            _ => {}
        }
    }

    runs
}

fn mark_line_end(runs: &mut [TextRun]) {
    if let Some(last) = runs.last_mut() {
        last.ends_line = true;
    }
}

fn push_run(runs: &mut Vec<TextRun>, text: String, state: &TextState) {
    if text.is_empty() {
        return;
    }
    let (x, y) = state.origin();
    runs.push(TextRun::new(text, x, y));
}

fn operand(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(number)
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn string_operand(object: &Object, font: Option<&FontDecoder>) -> Option<String> {
    match object {
        Object::String(bytes, _) => decode_with(font, bytes),
        _ => None,
    }
}

/// Decodes with the current font; strings shown before any known `Tf` fall
/// back to `decode_pdf_string`.
fn decode_with(font: Option<&FontDecoder>, bytes: &[u8]) -> Option<String> {
    match font {
        Some(font) => font.decode(bytes),
        None => decode_pdf_string(bytes),
    }
}

/// Best-effort decoding of a PDF string operand without font information:
/// UTF-16BE when it carries a byte-order mark, otherwise UTF-8, otherwise
/// WinAnsi.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let decoded = if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        String::from_utf16_lossy(&units)
    } else if let Ok(text) = std::str::from_utf8(bytes) {
        text.to_string()
    } else {
        Document::decode_text(Some("WinAnsiEncoding"), bytes)
    };
    clean_text(decoded)
}

fn clean_text(decoded: String) -> Option<String> {
    let cleaned = decoded
        .chars()
        .filter(|ch| !ch.is_control() || *ch == ' ' || *ch == '\t')
        .collect::<String>();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
