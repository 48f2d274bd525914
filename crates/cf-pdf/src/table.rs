/// Heuristic trigger for a supplementary table-formatted raster pass: does
/// this page's extracted text look like a table? Two independent signals:
/// multi-space columns, and runs of consecutive lines with similar token
/// counts (catches tables where pdfium collapses column gaps to one space).
pub fn looks_like_table(text: &str) -> bool {
    let non_empty: Vec<&str> = text.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    if non_empty.len() < 3 {
        return false;
    }

    let tabular_lines = non_empty
        .iter()
        .filter(|line| {
            let mut space_groups = 0;
            let mut in_spaces = false;
            let mut space_count = 0;
            for ch in line.chars() {
                if ch == ' ' || ch == '\t' {
                    space_count += 1;
                    if space_count >= 2 && !in_spaces {
                        space_groups += 1;
                        in_spaces = true;
                    }
                } else {
                    space_count = 0;
                    in_spaces = false;
                }
            }
            space_groups >= 2
        })
        .count();
    if (tabular_lines as f64 / non_empty.len() as f64) >= 0.4 {
        return true;
    }

    // Threshold of 6 avoids false positives from bullet lists and TOC entries.
    let token_counts: Vec<usize> = non_empty.iter().map(|line| line.split_whitespace().count()).collect();
    let mut best_run = 1;
    let mut current_run = 1;
    for i in 1..token_counts.len() {
        let (prev, curr) = (token_counts[i - 1], token_counts[i]);
        if prev >= 3 && curr >= 3 && ((prev as isize) - (curr as isize)).abs() <= 2 {
            current_run += 1;
            best_run = best_run.max(current_run);
        } else {
            current_run = 1;
        }
    }
    best_run >= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multi_space_columns() {
        let text = "Name    Age    City\nAlice    30    NYC\nBob      25    LA\nCarl     40    SF";
        assert!(looks_like_table(text));
    }

    #[test]
    fn detects_consistent_token_run() {
        let lines: Vec<String> = (0..8).map(|i| format!("col{i} val{i} unit{i}")).collect();
        assert!(looks_like_table(&lines.join("\n")));
    }

    #[test]
    fn prose_is_not_a_table() {
        let text = "This is a normal paragraph of text that does not look tabular at all, \
                     it just flows across the page in ordinary sentences.";
        assert!(!looks_like_table(text));
    }

    #[test]
    fn too_few_lines_never_triggers() {
        assert!(!looks_like_table("a   b\nc   d"));
    }
}
