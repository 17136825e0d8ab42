//! Tolerant extraction of a structured verdict from a raw model completion
//!
//! Language models do not reliably emit clean JSON: completions arrive inside
//! markdown code fences, or as two adjacent objects glued together. This
//! module reduces a raw completion to a single JSON object through an ordered
//! chain of repair strategies, then validates the result into a
//! [`ThreatVerdict`]. Extraction is a pure function: no side effects, and
//! identical input always yields an identical result.

use crate::error::AnalyzerError;
use crate::models::{ThreatLabel, ThreatVerdict};
use serde_json::{Map, Value};

/// Reduce a raw completion to a validated verdict
///
/// Failure at any step returns [`AnalyzerError::Parse`] carrying the original
/// raw text. No partial or defaulted verdict is ever produced.
pub fn extract(raw: &str) -> Result<ThreatVerdict, AnalyzerError> {
    let object = reduce_to_object(raw)?;
    validate(&object).map_err(|reason| AnalyzerError::Parse {
        reason,
        raw: raw.to_string(),
    })
}

/// Apply the repair chain and parse the first candidate that yields a single
/// JSON object
///
/// Candidates are tried in order: the fence-stripped text as-is, then the
/// adjacent-object merge if its trigger pattern is present. First success
/// wins.
fn reduce_to_object(raw: &str) -> Result<Map<String, Value>, AnalyzerError> {
    let stripped = strip_code_fences(raw.trim());

    let mut candidates = vec![stripped.to_string()];
    if let Some(merged) = merge_adjacent_objects(stripped) {
        candidates.push(merged);
    }

    let mut first_failure = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => {
                first_failure
                    .get_or_insert_with(|| format!("expected a JSON object, got {}", json_type(&other)));
            }
            Err(e) => {
                first_failure.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(AnalyzerError::Parse {
        reason: first_failure.unwrap_or_else(|| "empty completion".to_string()),
        raw: raw.to_string(),
    })
}

/// Strip a leading code-fence marker (with optional language tag) and a
/// trailing fence marker, when present
fn strip_code_fences(text: &str) -> &str {
    let mut inner = text;

    if let Some(rest) = inner.strip_prefix("```") {
        // Drop the language tag line ("json", "JSON", empty)
        inner = match rest.split_once('\n') {
            Some((_tag, body)) => body,
            None => rest,
        };
    }

    if let Some(rest) = inner.trim_end().strip_suffix("```") {
        inner = rest;
    }

    inner.trim()
}

/// Repair the known failure mode of two JSON objects emitted back-to-back
///
/// Triggered by a closing brace immediately followed by a newline and an
/// opening brace. The two objects' bodies are concatenated into one object
/// with a separating comma. Only the two-object case is handled; three or
/// more objects are outside this repair's contract.
fn merge_adjacent_objects(text: &str) -> Option<String> {
    let boundary = text.find("}\n{")?;
    let (head, tail) = (&text[..boundary], &text[boundary + 3..]);

    let head_body = head.split_once('{').map(|(_, body)| body)?;
    let tail_body = tail.rsplit_once('}').map(|(body, _)| body)?;

    Some(format!("{{{},{}}}", head_body.trim(), tail_body.trim()))
}

/// Validate the four required verdict fields out of a parsed object
fn validate(object: &Map<String, Value>) -> Result<ThreatVerdict, String> {
    let threat_value = object
        .get("threat")
        .ok_or_else(|| "missing field `threat`".to_string())?;
    let threat: ThreatLabel = serde_json::from_value(threat_value.clone())
        .map_err(|_| format!("invalid threat label: {}", threat_value))?;

    let confidence_value = object
        .get("confidence")
        .ok_or_else(|| "missing field `confidence`".to_string())?;
    let confidence = coerce_confidence(confidence_value)
        .ok_or_else(|| format!("confidence is not an integer in [0,100]: {}", confidence_value))?;

    let evidence = object
        .get("evidence")
        .ok_or_else(|| "missing field `evidence`".to_string())?;
    if evidence.is_null() {
        return Err("field `evidence` is null".to_string());
    }

    let recommendation = object
        .get("recommendation")
        .ok_or_else(|| "missing field `recommendation`".to_string())?
        .as_str()
        .ok_or_else(|| "field `recommendation` is not a string".to_string())?;

    Ok(ThreatVerdict {
        threat,
        confidence,
        evidence: evidence.clone(),
        recommendation: recommendation.to_string(),
    })
}

/// Coerce a numeric-looking confidence value to an integer in [0,100]
///
/// Integer-valued floats and numeric strings are accepted; anything
/// out-of-range or non-numeric is a validation failure, never clamped.
fn coerce_confidence(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };

    if (0..=100).contains(&n) {
        Some(n as u8)
    } else {
        None
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
