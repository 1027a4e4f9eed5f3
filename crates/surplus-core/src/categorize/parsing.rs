//! Parsing of categorization responses
//!
//! Models answer in whatever shape they like despite the prompt, so three are
//! accepted: a JSON array (positional), a JSON object keyed by line number,
//! or numbered lines such as `1: Groceries` or `2. Dining Out`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[-*]?\s*(\d+)\s*[:.)\-]\s*(.*?)\s*$").expect("valid regex")
    })
}

/// Map a model label onto an allowed category
///
/// Exact matches win; otherwise a case-insensitive match is mapped to the
/// allowed spelling. Anything else, including "none", is uncategorized.
pub fn canonical_label(label: &str, allowed: &[String]) -> Option<String> {
    let label = label
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim();
    if label.is_empty() {
        return None;
    }
    if let Some(exact) = allowed.iter().find(|a| a.as_str() == label) {
        return Some(exact.clone());
    }
    let lowered = label.to_lowercase();
    allowed
        .iter()
        .find(|a| a.to_lowercase() == lowered)
        .cloned()
}

fn label_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("category").and_then(Value::as_str),
        _ => None,
    }
}

fn parse_json(response: &str, count: usize, allowed: &[String]) -> Option<Vec<Option<String>>> {
    let start = response.find(['[', '{'])?;
    let end = response.rfind([']', '}'])?;
    if start >= end {
        return None;
    }
    let value: Value = serde_json::from_str(&response[start..=end]).ok()?;

    let mut result = vec![None; count];
    match value {
        Value::Array(items) => {
            for (slot, item) in result.iter_mut().zip(items.iter()) {
                *slot = label_of(item).and_then(|l| canonical_label(l, allowed));
            }
        }
        Value::Object(map) => {
            for (key, item) in &map {
                let Ok(index) = key.trim().parse::<usize>() else {
                    continue;
                };
                if index == 0 || index > count {
                    continue;
                }
                result[index - 1] = label_of(item).and_then(|l| canonical_label(l, allowed));
            }
        }
        _ => return None,
    }
    Some(result)
}

fn parse_lines(response: &str, count: usize, allowed: &[String]) -> Vec<Option<String>> {
    let mut found: BTreeMap<usize, Option<String>> = BTreeMap::new();
    for line in response.lines() {
        let Some(caps) = numbered_line().captures(line) else {
            continue;
        };
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        if index == 0 || index > count {
            continue;
        }
        // First answer for a line wins
        found
            .entry(index)
            .or_insert_with(|| canonical_label(&caps[2], allowed));
    }

    (1..=count)
        .map(|i| found.get(&i).cloned().flatten())
        .collect()
}

/// Parse a categorization response for `count` transactions
///
/// Always returns exactly `count` entries; unanswered or unknown lines are None.
pub fn parse_categorization(
    response: &str,
    count: usize,
    allowed: &[String],
) -> Vec<Option<String>> {
    let response = response.trim();
    parse_json(response, count, allowed).unwrap_or_else(|| parse_lines(response, count, allowed))
}
