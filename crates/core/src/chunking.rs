use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub delimiter: String,
    pub max_chars_soft: usize,
    pub max_chars_hard: usize,
    pub min_chars_soft: usize,
    pub min_lines: usize,
}

impl ChunkingConfig {
    pub fn standard() -> Self {
        Self {
            delimiter: "\n\n".to_string(),
            max_chars_soft: 4_000,
            max_chars_hard: 12_000,
            min_chars_soft: 600,
            min_lines: 1,
        }
    }

    pub fn large() -> Self {
        Self {
            delimiter: "\n\n".to_string(),
            max_chars_soft: 8_000,
            max_chars_hard: 20_000,
            min_chars_soft: 1_200,
            min_lines: 1,
        }
    }

    fn hard_limit(&self) -> usize {
        self.max_chars_hard.max(self.max_chars_soft).max(1)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkProfile {
    Standard,
    Large,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveChunking {
    pub standard: ChunkingConfig,
    pub large: ChunkingConfig,
    /// Chunk budget above which the text is re-chunked with `large`.
    pub max_chunks: usize,
}

impl Default for AdaptiveChunking {
    fn default() -> Self {
        Self {
            standard: ChunkingConfig::standard(),
            large: ChunkingConfig::large(),
            max_chunks: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<String>,
    pub profile: ChunkProfile,
    /// Chunk count under the standard parameters.
    pub naive_count: usize,
}

pub fn chunk_adaptive(text: &str, options: &AdaptiveChunking) -> ChunkPlan {
    let chunks = chunk_text(text, &options.standard);
    let naive_count = chunks.len();

    if naive_count > options.max_chunks {
        return ChunkPlan {
            chunks: chunk_text(text, &options.large),
            profile: ChunkProfile::Large,
            naive_count,
        };
    }

    ChunkPlan {
        chunks,
        profile: ChunkProfile::Standard,
        naive_count,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

struct Piece {
    text: String,
    chars: usize,
    lines: usize,
}

impl Piece {
    fn new(text: String) -> Self {
        Self {
            chars: char_len(&text),
            lines: text.lines().count().max(1),
            text,
        }
    }
}

/// Splits `text` on the delimiter and packs the paragraphs into chunks.
///
/// A chunk closes once adding the next paragraph would pass the soft max,
/// provided it already holds `min_chars_soft` characters and `min_lines`
/// lines; otherwise it keeps growing up to the hard max. Paragraphs longer
/// than the hard max are split on line breaks, then on whitespace.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let hard = config.hard_limit();
    let delimiter = if config.delimiter.is_empty() {
        "\n\n"
    } else {
        config.delimiter.as_str()
    };
    let delimiter_chars = char_len(delimiter);

    let mut pieces = Vec::new();
    for paragraph in text.split(delimiter) {
        if paragraph.trim().is_empty() {
            continue;
        }
        if char_len(paragraph) <= hard {
            pieces.push(Piece::new(paragraph.to_string()));
        } else {
            pieces.extend(split_oversized(paragraph, config).into_iter().map(Piece::new));
        }
    }

    let mut chunks: Vec<Piece> = Vec::new();
    let mut current: Option<Piece> = None;

    for piece in pieces {
        let Some(mut open) = current.take() else {
            current = Some(piece);
            continue;
        };

        let combined = open.chars + delimiter_chars + piece.chars;
        let satisfied = open.chars >= config.min_chars_soft && open.lines >= config.min_lines;

        if combined > hard || (combined > config.max_chars_soft && satisfied) {
            close_chunk(&mut chunks, open, config, delimiter);
            current = Some(piece);
        } else {
            open.text.push_str(delimiter);
            open.text.push_str(&piece.text);
            open.chars = combined;
            open.lines += piece.lines;
            current = Some(open);
        }
    }

    if let Some(last) = current {
        close_chunk(&mut chunks, last, config, delimiter);
    }

    chunks.into_iter().map(|piece| piece.text).collect()
}

/// Pushes a finished chunk, folding it into the previous one when it is
/// below the soft minimum and the merge stays within the hard max.
fn close_chunk(chunks: &mut Vec<Piece>, piece: Piece, config: &ChunkingConfig, delimiter: &str) {
    if piece.chars < config.min_chars_soft {
        if let Some(previous) = chunks.last_mut() {
            let combined = previous.chars + char_len(delimiter) + piece.chars;
            if combined <= config.hard_limit() {
                previous.text.push_str(delimiter);
                previous.text.push_str(&piece.text);
                previous.chars = combined;
                previous.lines += piece.lines;
                return;
            }
        }
    }
    chunks.push(piece);
}

fn split_oversized(paragraph: &str, config: &ChunkingConfig) -> Vec<String> {
    let hard = config.hard_limit();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_lines = 0usize;

    for line in paragraph.split('\n') {
        let segments = if char_len(line) > hard {
            split_long_line(line, hard)
        } else {
            vec![line.to_string()]
        };

        for segment in segments {
            let segment_chars = char_len(&segment);
            let joiner = usize::from(!current.is_empty());
            let combined = current_chars + joiner + segment_chars;
            let satisfied = current_lines >= config.min_lines;

            if !current.is_empty()
                && (combined > hard || (combined > config.max_chars_soft && satisfied))
            {
                out.push(std::mem::take(&mut current));
                current_chars = 0;
                current_lines = 0;
            }

            if !current.is_empty() {
                current.push('\n');
                current_chars += 1;
            }
            current.push_str(&segment);
            current_chars += segment_chars;
            current_lines += 1;
        }
    }

    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

/// Cuts a single line into pieces of at most `limit` characters, preferring
/// the last whitespace in the back half of each window.
fn split_long_line(line: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + limit).min(chars.len());
        let mut cut = end;
        if end < chars.len() {
            let floor = start + limit / 2;
            if let Some(space) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                cut = space + 1;
            }
        }
        out.push(chars[start..cut].iter().collect());
        start = cut;
    }

    out
}
