//! Response validation: raw model text → typed, sanitised components.
//!
//! Two failure granularities are kept apart:
//!
//! * **Payload**: text that cannot be read as a JSON array at all fails the
//!   run with [`DigitizerError::ResponseParse`].
//! * **Field**: a missing, mistyped or out-of-range field never fails. It is
//!   replaced from the default table below, and coordinates are clamped.
//!
//! | Field | Default |
//! |---|---|
//! | `id` | `UNK-xxxx` (4 random base-36 chars); numbers are stringified |
//! | `type` | `Unknown Component` |
//! | `label`, `description` | empty |
//! | `coordinates.x`, `coordinates.y` | 50, each clamped to `[0, 100]` |
//! | `initialStatus` | `UNKNOWN` |
//! | `uaeStandardNote` | `No specific note.` |

use crate::error::DigitizerError;
use crate::model::{clamp_percent, Component, ComponentStatus, Coordinates};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_TYPE: &str = "Unknown Component";
pub const DEFAULT_NOTE: &str = "No specific note.";
/// Prefix of synthesized component ids.
pub const SYNTHETIC_ID_PREFIX: &str = "UNK-";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Parse and hydrate a model response.
///
/// Blank text is an empty inventory, not an error.
///
/// # Errors
/// [`DigitizerError::ResponseParse`] when the text, after fence stripping,
/// is not a JSON array.
pub fn normalize(raw: &str) -> Result<Vec<Component>, DigitizerError> {
    let payload = strip_code_fences(raw);
    if payload.is_empty() {
        debug!("Model returned no text; treating as empty inventory");
        return Ok(Vec::new());
    }

    let elements = parse_array(payload)?;
    let components: Vec<Component> = elements.iter().map(hydrate).collect();
    debug!("Validated {} components", components.len());
    Ok(components)
}

// ── Fence stripping ──────────────────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```$").unwrap());

/// Remove a leading marker line and a trailing marker line, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(m) = RE_OPEN_FENCE.find(s) {
        s = &s[m.end()..];
    }
    if let Some(m) = RE_CLOSE_FENCE.find(s) {
        s = &s[..m.start()];
    }
    s.trim()
}

// ── Payload parse ────────────────────────────────────────────────────────

fn parse_array(payload: &str) -> Result<Vec<Value>, DigitizerError> {
    let first_err = match serde_json::from_str::<Value>(payload) {
        Ok(value) => return into_array(value),
        Err(e) => e,
    };

    // Prose around the array: retry on the outermost brackets.
    if let (Some(start), Some(end)) = (payload.find('['), payload.rfind(']')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&payload[start..=end]) {
                warn!(
                    "Model response had text around the JSON array; recovered {} bytes",
                    end - start + 1
                );
                return into_array(value);
            }
        }
    }

    let preview: String = payload.chars().take(200).collect();
    debug!("Unparseable model response: {preview}");
    Err(DigitizerError::ResponseParse {
        detail: first_err.to_string(),
    })
}

fn into_array(value: Value) -> Result<Vec<Value>, DigitizerError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DigitizerError::ResponseParse {
            detail: format!("expected a JSON array of components, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Per-field hydration ──────────────────────────────────────────────────

/// Build a component from one array element, defaulting every bad field.
///
/// `currentStatus` always starts equal to `initialStatus`.
pub fn hydrate(raw: &Value) -> Component {
    let initial_status = text_field(raw, "initialStatus")
        .and_then(ComponentStatus::parse_lenient)
        .unwrap_or_default();

    Component {
        id: component_id(raw.get("id")),
        kind: text_field(raw, "type").unwrap_or(DEFAULT_TYPE).to_string(),
        label: text_field(raw, "label").unwrap_or_default().to_string(),
        description: text_field(raw, "description").unwrap_or_default().to_string(),
        coordinates: coordinates(raw.get("coordinates")),
        initial_status,
        current_status: initial_status,
        uae_standard_note: text_field(raw, "uaeStandardNote")
            .unwrap_or(DEFAULT_NOTE)
            .to_string(),
        last_inspected: text_field(raw, "lastInspected").map(str::to_string),
    }
}

/// A non-blank string field.
fn text_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn component_id(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => synthetic_id(),
    }
}

/// `UNK-` followed by 4 random base-36 characters.
pub fn synthetic_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{SYNTHETIC_ID_PREFIX}{suffix}")
}

fn coordinates(raw: Option<&Value>) -> Coordinates {
    let axis = |key: &str| {
        raw.and_then(|c| c.get(key))
            .and_then(Value::as_f64)
            .map(clamp_percent)
            .unwrap_or(Coordinates::CENTER.x)
    };
    Coordinates {
        x: axis("x"),
        y: axis("y"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TWO_VALVES: &str = r#"[
        {"id":"HV-101","type":"Gate Valve","label":"Inlet","description":"6in gate",
         "coordinates":{"x":12.5,"y":40},"initialStatus":"OPERATIONAL","uaeStandardNote":"ADNOC ok"},
        {"id":"PSV-2001","type":"Safety Valve","coordinates":{"x":80,"y":20},
         "initialStatus":"CRITICAL_REPAIR","uaeStandardNote":"Recertify"}
    ]"#;

    #[test]
    fn fenced_and_unfenced_parse_identically() {
        let plain = normalize(TWO_VALVES).unwrap();
        let fenced = normalize(&format!("```json\n{TWO_VALVES}\n```")).unwrap();
        let bare_fence = normalize(&format!("```\n{TWO_VALVES}\n```")).unwrap();

        assert_eq!(plain.len(), 2);
        assert_eq!(
            plain.iter().map(|c| &c.id).collect::<Vec<_>>(),
            fenced.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        assert_eq!(plain[0].coordinates, fenced[0].coordinates);
        assert_eq!(plain[1].initial_status, bare_fence[1].initial_status);
    }

    #[test]
    fn strip_fences_leaves_plain_text_alone() {
        assert_eq!(strip_code_fences("  [1, 2]  "), "[1, 2]");
        assert_eq!(strip_code_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("```JSON [] ```"), "[]");
    }

    #[test]
    fn unparseable_text_is_parse_error() {
        let err = normalize("I could not find any components, sorry.").unwrap_err();
        assert!(matches!(err, DigitizerError::ResponseParse { .. }));
        assert_eq!(err.failure_kind(), crate::error::FailureKind::Analysis);
    }

    #[test]
    fn bare_object_is_parse_error() {
        let err = normalize(r#"{"id":"HV-1"}"#).unwrap_err();
        assert!(err.to_string().contains("an object"), "got: {err}");
    }

    #[test]
    fn prose_wrapped_array_is_recovered() {
        let out = normalize(r#"Here is the inventory: [{"id":"FT-3"}] Hope this helps."#).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "FT-3");
    }

    #[test]
    fn blank_response_is_empty_inventory() {
        assert!(normalize("   ").unwrap().is_empty());
        assert!(normalize("```json\n```").unwrap().is_empty());
    }

    #[test]
    fn coordinates_are_clamped_per_axis() {
        let cases = [
            (json!(-50), 0.0),
            (json!(0), 0.0),
            (json!(50), 50.0),
            (json!(100), 100.0),
            (json!(150), 100.0),
            (json!("abc"), 50.0),
            (json!(null), 50.0),
        ];
        for (input, expected) in cases {
            let c = hydrate(&json!({"id": "X", "coordinates": {"x": input, "y": input}}));
            assert_eq!(c.coordinates.x, expected, "x for {input}");
            assert_eq!(c.coordinates.y, expected, "y for {input}");
        }
    }

    #[test]
    fn axes_clamp_independently() {
        let c = hydrate(&json!({"coordinates": {"x": 150, "y": -3}}));
        assert_eq!(c.coordinates, Coordinates { x: 100.0, y: 0.0 });
        let c = hydrate(&json!({"coordinates": {"y": 12}}));
        assert_eq!(c.coordinates, Coordinates { x: 50.0, y: 12.0 });
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c = hydrate(&json!({}));
        assert!(c.id.starts_with(SYNTHETIC_ID_PREFIX));
        assert_eq!(c.id.len(), 8);
        assert_eq!(c.kind, DEFAULT_TYPE);
        assert_eq!(c.label, "");
        assert_eq!(c.description, "");
        assert_eq!(c.coordinates, Coordinates::CENTER);
        assert_eq!(c.initial_status, ComponentStatus::Unknown);
        assert_eq!(c.current_status, ComponentStatus::Unknown);
        assert_eq!(c.uae_standard_note, DEFAULT_NOTE);
        assert_eq!(c.last_inspected, None);
    }

    #[test]
    fn non_object_element_becomes_default_component() {
        let out = normalize(r#"["HV-1", 7, null]"#).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.kind == DEFAULT_TYPE));
    }

    #[test]
    fn current_status_mirrors_initial_status() {
        for (raw, expected) in [
            ("MAINTENANCE_REQUIRED", ComponentStatus::MaintenanceRequired),
            ("critical repair", ComponentStatus::CriticalRepair),
            ("BROKEN", ComponentStatus::Unknown),
        ] {
            let c = hydrate(&json!({"initialStatus": raw}));
            assert_eq!(c.initial_status, expected);
            assert_eq!(c.current_status, expected);
        }
        let c = hydrate(&json!({"initialStatus": 3}));
        assert_eq!(c.current_status, ComponentStatus::Unknown);
    }

    #[test]
    fn numeric_and_blank_ids() {
        assert_eq!(hydrate(&json!({"id": 101})).id, "101");
        assert!(hydrate(&json!({"id": "  "})).id.starts_with("UNK-"));
        assert!(hydrate(&json!({"id": true})).id.starts_with("UNK-"));
    }

    #[test]
    fn synthetic_ids_use_base36() {
        for _ in 0..20 {
            let id = synthetic_id();
            assert!(id[4..].bytes().all(|b| ID_ALPHABET.contains(&b)), "{id}");
        }
    }

    #[test]
    fn last_inspected_is_kept_when_present() {
        let c = hydrate(&json!({"lastInspected": "2024-01-15"}));
        assert_eq!(c.last_inspected.as_deref(), Some("2024-01-15"));
    }

    #[test]
    fn emission_order_is_preserved() {
        let out = normalize(TWO_VALVES).unwrap();
        assert_eq!(out[0].id, "HV-101");
        assert_eq!(out[1].id, "PSV-2001");
        assert_eq!(out[1].label, "");
    }
}
