use cf_core::StructureTemplate;

/// Field-presence signature a template expects, used for fingerprint scoring
/// against a sample of top-level items (spec §4.4).
pub struct TemplateSignature {
    pub template: StructureTemplate,
    pub required_any_of: &'static [&'static [&'static str]],
    pub optional: &'static [&'static str],
}

pub const TEMPLATES: &[TemplateSignature] = &[
    TemplateSignature {
        template: StructureTemplate::IssueTracker,
        required_any_of: &[&["id", "key"], &["summary", "title"], &["status"]],
        optional: &["assignee", "priority", "labels", "reporter"],
    },
    TemplateSignature {
        template: StructureTemplate::WikiPage,
        required_any_of: &[&["id"], &["title"], &["body", "content"]],
        optional: &["space", "ancestors", "version"],
    },
];

/// Does `fields` (the set of keys present on a sampled item) satisfy every
/// `required_any_of` group for this template?
fn satisfies_required(sig: &TemplateSignature, fields: &std::collections::HashSet<&str>) -> bool {
    sig.required_any_of
        .iter()
        .all(|group| group.iter().any(|candidate| fields.contains(candidate)))
}

fn optional_coverage(sig: &TemplateSignature, fields: &std::collections::HashSet<&str>) -> usize {
    sig.optional.iter().filter(|f| fields.contains(*f)).count()
}

/// Score every built-in template against a set of sampled items' field sets.
/// Returns the first template where ALL items satisfy the required groups,
/// ties broken by summed optional-field coverage; falls back to `Generic`.
pub fn detect_template(item_field_sets: &[std::collections::HashSet<&str>]) -> StructureTemplate {
    if item_field_sets.is_empty() {
        return StructureTemplate::Generic;
    }

    let mut best: Option<(StructureTemplate, usize)> = None;
    for sig in TEMPLATES {
        let all_satisfy = item_field_sets.iter().all(|fields| satisfies_required(sig, fields));
        if !all_satisfy {
            continue;
        }
        let coverage: usize = item_field_sets.iter().map(|fields| optional_coverage(sig, fields)).sum();
        if best.as_ref().is_none_or(|(_, best_cov)| coverage > *best_cov) {
            best = Some((sig.template, coverage));
        }
    }

    best.map(|(t, _)| t).unwrap_or(StructureTemplate::Generic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fields(keys: &[&'static str]) -> HashSet<&'static str> {
        keys.iter().copied().collect()
    }

    #[test]
    fn detects_issue_tracker_shape() {
        let items = vec![fields(&["id", "title", "status", "assignee"]); 10];
        assert_eq!(detect_template(&items), StructureTemplate::IssueTracker);
    }

    #[test]
    fn detects_wiki_page_shape() {
        let items = vec![fields(&["id", "title", "body", "space"]); 10];
        assert_eq!(detect_template(&items), StructureTemplate::WikiPage);
    }

    #[test]
    fn falls_back_to_generic_for_unrecognized_shape() {
        let items = vec![fields(&["foo", "bar"]); 10];
        assert_eq!(detect_template(&items), StructureTemplate::Generic);
    }

    #[test]
    fn empty_sample_is_generic() {
        assert_eq!(detect_template(&[]), StructureTemplate::Generic);
    }
}
