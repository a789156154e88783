//! Line reconstruction and cleanup between raw text runs and page text.

use crate::config::LayoutOptions;
use crate::extractor::TextRun;
use std::collections::{HashMap, HashSet};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_line_key(line: &str) -> String {
    normalize_whitespace(line).to_lowercase()
}

/// Groups runs into lines. A vertical move larger than `threshold` closes the
/// current line before the run; a run flagged `ends_line` closes it after.
/// A line-end flag on an empty line yields an empty line.
pub fn group_runs_into_lines(runs: &[TextRun], threshold: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut last_y: Option<f32> = None;

    for run in runs {
        if let Some(previous) = last_y {
            if (run.y - previous).abs() > threshold && !current.is_empty() {
                lines.push(current.join(" "));
                current.clear();
            }
        }

        if !run.text.is_empty() {
            current.push(&run.text);
        }

        if run.ends_line {
            if current.is_empty() {
                lines.push(String::new());
            } else {
                lines.push(current.join(" "));
                current.clear();
            }
        }

        last_y = Some(run.y);
    }

    if !current.is_empty() {
        lines.push(current.join(" "));
    }

    lines
}

/// Drops running headers and footers.
///
/// The first and last `header_footer_lines` non-blank lines of each page are
/// slot candidates. A normalized candidate repeating on at least
/// `ceil(pages * ratio)` pages (and never fewer than two) is removed, but only
/// where it sits in the matching slot. Body occurrences are kept.
pub fn remove_repeated_headers_footers(
    pages: Vec<Vec<String>>,
    options: &LayoutOptions,
) -> Vec<Vec<String>> {
    if pages.len() < 2 {
        return pages;
    }

    let slot = options.header_footer_lines;
    let mut header_counts: HashMap<String, usize> = HashMap::new();
    let mut footer_counts: HashMap<String, usize> = HashMap::new();

    for lines in &pages {
        let meaningful = lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>();
        let footer_start = meaningful.len().saturating_sub(slot);

        for line in meaningful.iter().take(slot) {
            *header_counts.entry(normalize_line_key(line)).or_default() += 1;
        }
        for line in &meaningful[footer_start..] {
            *footer_counts.entry(normalize_line_key(line)).or_default() += 1;
        }
    }

    let min_repeats = ((pages.len() as f64 * options.header_footer_repeat_ratio).ceil() as usize).max(2);
    let repeated = |counts: HashMap<String, usize>| -> HashSet<String> {
        counts
            .into_iter()
            .filter(|(_, count)| *count >= min_repeats)
            .map(|(line, _)| line)
            .collect()
    };
    let headers = repeated(header_counts);
    let footers = repeated(footer_counts);

    if headers.is_empty() && footers.is_empty() {
        return pages;
    }

    pages
        .into_iter()
        .map(|lines| {
            let total = lines.iter().filter(|line| !line.trim().is_empty()).count();
            let mut index = 0usize;
            lines
                .into_iter()
                .filter(|line| {
                    if line.trim().is_empty() {
                        return true;
                    }
                    let key = normalize_line_key(line);
                    let in_header = index < slot;
                    let in_footer = index + slot >= total;
                    index += 1;
                    !((in_header && headers.contains(&key)) || (in_footer && footers.contains(&key)))
                })
                .collect()
        })
        .collect()
}

/// Rejoins words wrapped with a trailing hyphen when the next non-blank line
/// continues in lowercase. Blank lines collapse to a single paragraph separator.
pub fn merge_hyphenated_lines(lines: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = normalize_whitespace(&lines[index]);
        index += 1;

        if line.is_empty() {
            if merged.last().is_some_and(|last| !last.is_empty()) {
                merged.push(String::new());
            }
            continue;
        }

        if line.ends_with('-') {
            let continuation = lines[index..]
                .iter()
                .position(|next| !next.trim().is_empty())
                .map(|offset| index + offset);
            if let Some(next_index) = continuation {
                let next = normalize_whitespace(&lines[next_index]);
                if next.chars().next().is_some_and(char::is_lowercase) {
                    merged.push(format!("{}{}", &line[..line.len() - 1], next));
                    index = next_index + 1;
                    continue;
                }
            }
        }

        merged.push(line);
    }

    merged
}
