//! Validation of oracle responses.
//!
//! Responses are untrusted: JSON may sit inside prose or code fences, field
//! names vary, confidence may be a string. Everything is clamped to the
//! verdict schema here and nothing past this module sees raw output.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use super::types::{ChunkVerdict, Classification};

/// Balanced JSON object or array starting at the beginning of `body`, by
/// bracket counting.
fn balanced_span(body: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[..i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced spans from every `{` or `[` in `input`, in order of position.
/// Spans overlap: a nested object is yielded after its parent.
fn json_candidates(input: &str) -> impl Iterator<Item = &str> {
    input
        .match_indices(['{', '['])
        .filter_map(move |(start, _)| balanced_span(&input[start..]))
}

/// First balanced JSON object or array in `input`.
pub fn extract_json(input: &str) -> Option<&str> {
    json_candidates(input).next()
}

/// First candidate span that is valid JSON of the wanted shape. Prose such
/// as `See [Table 3]` or `claim [1]` ahead of the payload is skipped.
fn find_value(input: &str, wanted: impl Fn(&Value) -> bool) -> Result<Value> {
    let mut seen_json = false;
    for span in json_candidates(input) {
        let Ok(value) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        seen_json = true;
        if wanted(&value) {
            return Ok(value);
        }
    }
    if seen_json {
        Err(anyhow!("no verdict of the expected shape in response"))
    } else {
        Err(anyhow!("no JSON found in response"))
    }
}

const CLASSIFICATION_FIELDS: [&str; 3] = ["classification", "match_type", "status"];
const LIST_FIELDS: [&str; 3] = ["results", "verdicts", "claims"];

fn is_verdict(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| field(obj, &CLASSIFICATION_FIELDS).is_some())
}

fn is_verdict_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_object))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n)).filter(|v| !v.is_null())
}

fn text_field(obj: &Map<String, Value>, names: &[&str]) -> String {
    match field(obj, names) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Confidence as an integer percentage in 0..=100. Accepts numbers and
/// numeric strings such as `"85"` or `"85%"`.
pub fn parse_confidence(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

fn verdict_from(obj: &Map<String, Value>) -> ChunkVerdict {
    let classification = field(obj, &CLASSIFICATION_FIELDS)
        .and_then(Value::as_str)
        .map(Classification::parse)
        .unwrap_or(Classification::NotFound);
    ChunkVerdict {
        classification,
        confidence: parse_confidence(field(obj, &["confidence", "confidence_score"])),
        evidence: text_field(obj, &["evidence", "snippet", "evidence_snippet"]),
        justification: text_field(obj, &["justification", "reasoning", "explanation"]),
    }
}

/// Parse a single-claim response. Errors when there is no usable object.
pub fn parse_single(input: &str) -> Result<ChunkVerdict> {
    let wanted = |v: &Value| {
        is_verdict(v) || v.as_array().and_then(|items| items.first()).is_some_and(is_verdict)
    };
    match find_value(input, wanted)? {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(obj)) => Ok(verdict_from(&obj)),
            _ => Err(anyhow!("expected a verdict object")),
        },
        Value::Object(obj) => Ok(verdict_from(&obj)),
        _ => Err(anyhow!("expected a verdict object")),
    }
}

/// Parse a batch response into exactly one verdict per entry of `claim_ids`,
/// in the same order. Entries are matched by `claim_id`; entries without one
/// fill the remaining slots positionally. Unknown ids are ignored and
/// missing claims become `not_found` with confidence 0.
///
/// Errors only when the response holds no result list at all.
pub fn parse_batch(input: &str, claim_ids: &[String]) -> Result<Vec<ChunkVerdict>> {
    let wanted = |v: &Value| match v {
        Value::Object(obj) => {
            LIST_FIELDS.iter().any(|k| obj.get(*k).is_some_and(Value::is_array))
                // A lone verdict object answers a batch of one.
                || (claim_ids.len() == 1 && is_verdict(v))
        }
        other => is_verdict_list(other),
    };
    let items = match find_value(input, wanted) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut obj)) => {
            let list = LIST_FIELDS.iter().find_map(|k| obj.remove(*k));
            match list {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(obj)],
            }
        }
        Ok(_) => return Err(anyhow!("batch response is not an object or array")),
        Err(e) => return Err(e.context("batch response has no results list")),
    };

    let mut slots: Vec<Option<ChunkVerdict>> = vec![None; claim_ids.len()];
    let mut unnamed = Vec::new();
    for item in items {
        let Value::Object(obj) = item else { continue };
        let id = match field(&obj, &["claim_id", "id", "parameter_id"]) {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        match id {
            Some(id) => {
                if let Some(pos) = claim_ids.iter().position(|c| *c == id) {
                    if slots[pos].is_none() {
                        slots[pos] = Some(verdict_from(&obj));
                    }
                }
            }
            None => unnamed.push(verdict_from(&obj)),
        }
    }

    let mut unnamed = unnamed.into_iter();
    Ok(slots
        .into_iter()
        .map(|slot| {
            slot.or_else(|| unnamed.next())
                .unwrap_or_else(|| ChunkVerdict::not_found("claim missing from batch response"))
        })
        .collect())
}
