/// One applied textual fixup, surfaced to callers so a report can say what
/// was repaired (spec §8 scenario: "report notes two repairs applied").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RepairNote {
    pub fixup: &'static str,
    pub detail: String,
}

/// Strip a leading UTF-8 BOM.
fn strip_bom(input: &str) -> Option<String> {
    input.strip_prefix('\u{feff}').map(|s| s.to_string())
}

/// Normalize curly quotes to their ASCII equivalents; JSON only accepts `"`.
fn normalize_smart_quotes(input: &str) -> Option<String> {
    if !input.contains(['\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}']) {
        return None;
    }
    Some(
        input
            .replace(['\u{201c}', '\u{201d}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'"),
    )
}

/// Remove a trailing comma immediately before a closing `]` or `}`, tracking
/// string-literal state so commas inside strings are never touched.
fn remove_trailing_commas(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as char;
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == '\\' {
                escaped = true;
            } else if b == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == '"' {
            in_string = true;
            out.push(b);
            i += 1;
            continue;
        }
        if b == ',' {
            // look ahead, skipping whitespace, for a closing bracket
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                j += 1;
            }
            if j < bytes.len() && matches!(bytes[j] as char, ']' | '}') {
                changed = true;
                i += 1;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    changed.then_some(out)
}

/// Escape raw control characters appearing inside string literals; valid JSON
/// strings may not contain unescaped bytes below `0x20`.
fn escape_control_chars(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;
    for ch in input.chars() {
        if in_string && !escaped && (ch as u32) < 0x20 && ch != '\n' && ch != '\t' {
            out.push_str(&format!("\\u{:04x}", ch as u32));
            changed = true;
            continue;
        }
        out.push(ch);
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        }
    }
    changed.then_some(out)
}

/// Truncate trailing garbage after the point where bracket depth last
/// returned to zero, recovering a partial-but-balanced document.
fn truncate_to_last_balanced_brace(input: &str) -> Option<String> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_balanced_end = None;
    for (idx, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    last_balanced_end = Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    match last_balanced_end {
        Some(end) if end < input.len() => Some(input[..end].to_string()),
        _ => None,
    }
}

/// Apply the ordered fixup list, returning the possibly-repaired text and the
/// notes for every fixup that actually changed something.
pub fn apply_repairs(input: &str) -> (String, Vec<RepairNote>) {
    let mut text = input.to_string();
    let mut notes = Vec::new();

    if let Some(next) = strip_bom(&text) {
        notes.push(RepairNote {
            fixup: "strip_bom",
            detail: "removed leading byte-order mark".into(),
        });
        text = next;
    }
    if let Some(next) = normalize_smart_quotes(&text) {
        notes.push(RepairNote {
            fixup: "normalize_smart_quotes",
            detail: "replaced curly quotes with ASCII equivalents".into(),
        });
        text = next;
    }
    if let Some(next) = remove_trailing_commas(&text) {
        notes.push(RepairNote {
            fixup: "remove_trailing_commas",
            detail: "removed trailing commas before closing brackets".into(),
        });
        text = next;
    }
    if let Some(next) = escape_control_chars(&text) {
        notes.push(RepairNote {
            fixup: "escape_control_chars",
            detail: "escaped raw control characters inside string literals".into(),
        });
        text = next;
    }
    if let Some(next) = truncate_to_last_balanced_brace(&text) {
        notes.push(RepairNote {
            fixup: "truncate_to_last_balanced_brace",
            detail: "discarded trailing content after the last balanced close".into(),
        });
        text = next;
    }

    (text, notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_trailing_comma_before_closing_brace() {
        let (fixed, notes) = apply_repairs(r#"{"a":1,"b":2,}"#);
        assert_eq!(fixed, r#"{"a":1,"b":2}"#);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].fixup, "remove_trailing_commas");
    }

    #[test]
    fn leaves_commas_inside_strings_alone() {
        let (fixed, notes) = apply_repairs(r#"{"a":"x,}"}"#);
        assert_eq!(fixed, r#"{"a":"x,}"}"#);
        assert!(notes.is_empty());
    }

    #[test]
    fn strips_bom_and_normalizes_quotes() {
        let input = "\u{feff}{\u{201c}a\u{201d}:1}";
        let (fixed, notes) = apply_repairs(input);
        assert_eq!(fixed, r#"{"a":1}"#);
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn truncates_trailing_garbage_after_balanced_object() {
        let (fixed, notes) = apply_repairs(r#"{"a":1}garbage tail"#);
        assert_eq!(fixed, r#"{"a":1}"#);
        assert!(notes.iter().any(|n| n.fixup == "truncate_to_last_balanced_brace"));
    }

    #[test]
    fn well_formed_input_produces_no_notes() {
        let (fixed, notes) = apply_repairs(r#"{"a":1,"b":[1,2,3]}"#);
        assert_eq!(fixed, r#"{"a":1,"b":[1,2,3]}"#);
        assert!(notes.is_empty());
    }
}
