use std::collections::HashMap;

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char
/// boundary, so multi-byte scripts never get cut mid-codepoint.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Join broken lines from raw pdfium text extraction into paragraphs, while
/// leaving table-shaped lines and list/heading markers alone.
pub fn cleanup_extracted_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current_para = String::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current_para.is_empty() {
                paragraphs.push(std::mem::take(&mut current_para));
            }
            continue;
        }

        let normalized = if looks_like_table_line(trimmed) {
            trimmed.to_string()
        } else {
            trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
        };

        if current_para.is_empty() {
            current_para = normalized;
        } else if should_break_before(&normalized) || should_break_after(&current_para) {
            current_para.push('\n');
            current_para.push_str(&normalized);
        } else {
            current_para.push(' ');
            current_para.push_str(&normalized);
        }
    }

    if !current_para.is_empty() {
        paragraphs.push(current_para);
    }

    paragraphs.join("\n\n")
}

fn looks_like_table_line(line: &str) -> bool {
    line.split("  ").filter(|s| !s.trim().is_empty()).count() >= 3
}

fn should_break_before(line: &str) -> bool {
    let first_char = line.chars().next().unwrap_or(' ');
    line.starts_with("- ")
        || line.starts_with("* ")
        || line.starts_with("\u{2022} ")
        || line.starts_with("# ")
        || line.starts_with("> ")
        || (first_char.is_ascii_digit() && line.contains(". "))
}

fn should_break_after(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    matches!(line.chars().last().unwrap_or(' '), '.' | '!' | '?' | ':')
}

/// Detect lines repeated across >=60% of pages (headers/footers) and drop
/// them from every page in place.
pub fn strip_headers_footers(page_texts: &mut [(u32, String)]) {
    if page_texts.len() < 3 {
        return;
    }
    let total = page_texts.len();
    let threshold = (total as f64 * 0.6).ceil() as usize;

    let mut first_lines: HashMap<String, usize> = HashMap::new();
    let mut last_lines: HashMap<String, usize> = HashMap::new();

    for (_, text) in page_texts.iter() {
        let lines: Vec<&str> = text.lines().collect();
        for line in lines.iter().take(3) {
            let trimmed = line.trim().to_string();
            if !trimmed.is_empty() && trimmed.len() < 200 {
                *first_lines.entry(trimmed).or_insert(0) += 1;
            }
        }
        for line in lines.iter().rev().take(3) {
            let trimmed = line.trim().to_string();
            if !trimmed.is_empty() && trimmed.len() < 200 {
                *last_lines.entry(trimmed).or_insert(0) += 1;
            }
        }
    }

    let headers: Vec<String> = first_lines.into_iter().filter(|(_, c)| *c >= threshold).map(|(l, _)| l).collect();
    let footers: Vec<String> = last_lines.into_iter().filter(|(_, c)| *c >= threshold).map(|(l, _)| l).collect();
    if headers.is_empty() && footers.is_empty() {
        return;
    }
    tracing::info!(headers = headers.len(), footers = footers.len(), "stripping repeated header/footer lines");

    for (_, text) in page_texts.iter_mut() {
        let filtered: Vec<&str> = text
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                !headers.iter().any(|h| h == trimmed) && !footers.iter().any(|f| f == trimmed)
            })
            .collect();
        *text = filtered.join("\n").trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_never_splits_a_multibyte_char() {
        let s = "hello \u{4e16}\u{754c}"; // "hello 世界"
        let t = truncate_str(s, 7);
        assert!(std::str::from_utf8(t.as_bytes()).is_ok());
    }

    #[test]
    fn joins_wrapped_sentence_lines() {
        let text = "This is a sentence that\nwraps across two lines.";
        assert_eq!(cleanup_extracted_text(text), "This is a sentence that wraps across two lines.");
    }

    #[test]
    fn keeps_bullet_points_separate() {
        let text = "Intro line.\n- item one\n- item two";
        let cleaned = cleanup_extracted_text(text);
        assert!(cleaned.contains("- item one"));
        assert!(cleaned.contains("- item two"));
    }

    #[test]
    fn strips_repeated_header_across_pages() {
        let mut pages = vec![
            (1, "CONFIDENTIAL\nBody one\nfooter".to_string()),
            (2, "CONFIDENTIAL\nBody two\nfooter".to_string()),
            (3, "CONFIDENTIAL\nBody three\nfooter".to_string()),
        ];
        strip_headers_footers(&mut pages);
        for (_, text) in &pages {
            assert!(!text.contains("CONFIDENTIAL"));
            assert!(!text.contains("footer"));
        }
    }

    #[test]
    fn does_not_strip_unique_body_text() {
        let mut pages = vec![
            (1, "Unique body one".to_string()),
            (2, "Unique body two".to_string()),
            (3, "Unique body three".to_string()),
        ];
        let before = pages.clone();
        strip_headers_footers(&mut pages);
        assert_eq!(pages, before);
    }
}
