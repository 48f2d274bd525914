//! Deterministic redaction of likely secrets in a [`serde_json::Value`] tree.
//!
//! Grounded on the pieBot redaction engine's deterministic walk-and-replace
//! design (`other_examples`), but target strings are swapped out for
//! `"[REDACTED:<kind>]"` placeholders rather than hash references, per spec
//! §4.6. The walk uses an explicit stack instead of recursion: an adversarial
//! payload with thousands of nested arrays must not blow the call stack.

use std::sync::OnceLock;

/// Which pattern matched, used in the `[REDACTED:<kind>]` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    AnthropicKey,
    OpenAiKey,
    GoogleApiKey,
    GitHubToken,
    SlackToken,
    BearerToken,
    JwtLike,
    Email,
    HighEntropy,
}

impl SecretKind {
    fn tag(self) -> &'static str {
        match self {
            SecretKind::AnthropicKey => "anthropic-key",
            SecretKind::OpenAiKey => "openai-key",
            SecretKind::GoogleApiKey => "google-api-key",
            SecretKind::GitHubToken => "github-token",
            SecretKind::SlackToken => "slack-token",
            SecretKind::BearerToken => "bearer-token",
            SecretKind::JwtLike => "jwt",
            SecretKind::Email => "email",
            SecretKind::HighEntropy => "high-entropy",
        }
    }
}

struct Pattern {
    kind: SecretKind,
    re: regex::Regex,
}

fn patterns() -> &'static Vec<Pattern> {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let specs: &[(SecretKind, &str)] = &[
            (SecretKind::AnthropicKey, r"sk-ant-[A-Za-z0-9_-]{20,}"),
            (SecretKind::OpenAiKey, r"sk-[A-Za-z0-9]{20,}"),
            (SecretKind::GoogleApiKey, r"AIza[A-Za-z0-9_-]{35}"),
            (SecretKind::GitHubToken, r"ghp_[A-Za-z0-9]{36,}"),
            (SecretKind::SlackToken, r"xox[baprs]-[A-Za-z0-9-]{10,}"),
            (SecretKind::BearerToken, r"(?i)bearer\s+[A-Za-z0-9._-]{16,}"),
            (
                SecretKind::JwtLike,
                r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
            ),
            (
                SecretKind::Email,
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            ),
        ];
        specs
            .iter()
            .map(|(kind, pat)| Pattern {
                kind: *kind,
                re: regex::Regex::new(pat).expect("static secret pattern must compile"),
            })
            .collect()
    })
}

/// A rough entropy heuristic for long token-like substrings that don't match
/// any named pattern but still look like a credential: long, no whitespace,
/// and a wide mix of character classes.
fn looks_high_entropy(token: &str) -> bool {
    if token.len() < 24 || token.len() > 256 {
        return false;
    }
    if token.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let has_lower = token.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = token.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    let classes = [has_lower, has_upper, has_digit].iter().filter(|b| **b).count();
    classes >= 2 && token.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '+'))
}

fn redact_string(input: &str) -> (String, usize) {
    let mut out = input.to_string();
    let mut hits = 0;
    for pattern in patterns() {
        if pattern.re.is_match(&out) {
            let replacement = format!("[REDACTED:{}]", pattern.kind.tag());
            let (next, count) = replace_all_counted(&out, &pattern.re, &replacement);
            out = next;
            hits += count;
        }
    }
    if hits == 0 && looks_high_entropy(out.trim()) {
        out = format!("[REDACTED:{}]", SecretKind::HighEntropy.tag());
        hits += 1;
    }
    (out, hits)
}

fn replace_all_counted(input: &str, re: &regex::Regex, replacement: &str) -> (String, usize) {
    let count = re.find_iter(input).count();
    (re.replace_all(input, replacement).into_owned(), count)
}

/// Outcome of scrubbing one JSON document.
pub struct ScrubReport {
    pub value: serde_json::Value,
    pub redaction_count: usize,
}

/// Walk `value` with an explicit stack, replacing matched substrings in every
/// string leaf. Object key order and array order are preserved.
pub fn scrub(value: &serde_json::Value) -> ScrubReport {
    let mut total_hits = 0;
    let scrubbed = scrub_value(value, &mut total_hits);
    ScrubReport {
        value: scrubbed,
        redaction_count: total_hits,
    }
}

/// A deferred unit of work in the explicit-stack walk: either "visit this
/// value" (pushed in reverse child order so children complete left-to-right)
/// or "pop N completed children off `results` and assemble them".
enum Task<'a> {
    Visit(&'a serde_json::Value),
    BuildArray(usize),
    BuildObject(Vec<String>),
}

fn scrub_value(root: &serde_json::Value, hits: &mut usize) -> serde_json::Value {
    let mut tasks = vec![Task::Visit(root)];
    let mut results: Vec<serde_json::Value> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Visit(serde_json::Value::String(s)) => {
                let (redacted, n) = redact_string(s);
                *hits += n;
                results.push(serde_json::Value::String(redacted));
            }
            Task::Visit(scalar @ (serde_json::Value::Null | serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => {
                results.push(scalar.clone());
            }
            Task::Visit(serde_json::Value::Array(items)) => {
                tasks.push(Task::BuildArray(items.len()));
                for item in items.iter().rev() {
                    tasks.push(Task::Visit(item));
                }
            }
            Task::Visit(serde_json::Value::Object(map)) => {
                let keys: Vec<String> = map.keys().cloned().collect();
                tasks.push(Task::BuildObject(keys));
                for value in map.values().rev() {
                    tasks.push(Task::Visit(value));
                }
            }
            Task::BuildArray(n) => {
                let start = results.len() - n;
                let items: Vec<_> = results.split_off(start);
                results.push(serde_json::Value::Array(items));
            }
            Task::BuildObject(keys) => {
                let start = results.len() - keys.len();
                let values: Vec<_> = results.split_off(start);
                let mut map = serde_json::Map::with_capacity(keys.len());
                for (key, value) in keys.into_iter().zip(values) {
                    map.insert(key, value);
                }
                results.push(serde_json::Value::Object(map));
            }
        }
    }

    results.pop().unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_anthropic_key_in_nested_string() {
        let input = json!({"headers": {"authorization": "sk-ant-REDACTED"}});
        let report = scrub(&input);
        assert_eq!(report.redaction_count, 1);
        assert_eq!(
            report.value["headers"]["authorization"],
            json!("[REDACTED:anthropic-key]")
        );
    }

    #[test]
    fn redacts_email_and_leaves_other_fields_alone() {
        let input = json!({"contact": "jane.doe@example.com", "count": 3, "ok": true});
        let report = scrub(&input);
        assert_eq!(report.redaction_count, 1);
        assert_eq!(report.value["contact"], json!("[REDACTED:email]"));
        assert_eq!(report.value["count"], json!(3));
        assert_eq!(report.value["ok"], json!(true));
    }

    #[test]
    fn is_idempotent_on_already_scrubbed_output() {
        let input = json!({"k": "sk-ant-REDACTED"});
        let once = scrub(&input).value;
        let twice = scrub(&once).value;
        assert_eq!(once, twice);
    }

    #[test]
    fn handles_deeply_nested_arrays_without_recursion() {
        let mut value = json!("sk-ant-REDACTED");
        for _ in 0..2000 {
            value = json!([value]);
        }
        let report = scrub(&value);
        assert_eq!(report.redaction_count, 1);
    }

    #[test]
    fn leaves_plain_text_alone() {
        let input = json!({"title": "Quarterly roadmap review"});
        let report = scrub(&input);
        assert_eq!(report.redaction_count, 0);
        assert_eq!(report.value, input);
    }
}
