use regex::Regex;
use std::sync::OnceLock;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[PAGE (\d+)\]").expect("page marker pattern is valid"))
}

pub fn page_marker(page: usize) -> String {
    format!("[PAGE {page}]")
}

/// Prefixes every page with its `[PAGE n]` marker and joins pages with a
/// blank line. Empty pages keep a bare marker so page numbering never shifts.
pub fn tag_pages(page_texts: &[String]) -> String {
    page_texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let marker = page_marker(index + 1);
            if text.is_empty() {
                marker
            } else {
                format!("{marker}\n{text}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn count_page_markers(full_text: &str) -> usize {
    marker_regex().find_iter(full_text).count()
}

/// Page each chunk should cite: the first marker when the chunk opens with
/// one, otherwise the last marker seen in earlier chunks.
pub fn page_references(chunks: &[String]) -> Vec<Option<u32>> {
    let mut current: Option<u32> = None;
    chunks
        .iter()
        .map(|chunk| {
            let mut markers = marker_regex()
                .captures_iter(chunk)
                .filter_map(|capture| {
                    let whole = capture.get(0)?;
                    let page = capture.get(1)?.as_str().parse::<u32>().ok()?;
                    Some((whole.start(), page))
                })
                .peekable();

            let opens_with_marker = markers
                .peek()
                .is_some_and(|(start, _)| chunk[..*start].trim().is_empty());
            let first = markers.peek().map(|(_, page)| *page);
            let reference = if opens_with_marker { first } else { current.or(first) };

            if let Some((_, last)) = markers.last() {
                current = Some(last);
            }
            reference
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_page_gets_exactly_one_marker_followed_by_its_text() {
        let pages = vec![
            "Introduction".to_string(),
            String::new(),
            "Conclusion".to_string(),
        ];
        let full = tag_pages(&pages);

        assert_eq!(count_page_markers(&full), pages.len());
        assert_eq!(full, "[PAGE 1]\nIntroduction\n\n[PAGE 2]\n\n[PAGE 3]\nConclusion");
    }

    #[test]
    fn tagging_is_deterministic() {
        let pages = vec!["a".to_string(), "b".to_string()];
        assert_eq!(tag_pages(&pages), tag_pages(&pages));
    }

    #[test]
    fn chunks_inherit_page_from_preceding_marker() {
        let chunks = vec![
            "[PAGE 1]\nabstract".to_string(),
            "method continues".to_string(),
            "tail of page one\n\n[PAGE 2]\nresults".to_string(),
            "[PAGE 3]\nappendix".to_string(),
        ];
        assert_eq!(
            page_references(&chunks),
            vec![Some(1), Some(1), Some(1), Some(3)]
        );
    }

    #[test]
    fn text_without_markers_has_no_page() {
        assert_eq!(page_references(&["loose text".to_string()]), vec![None]);
    }
}
