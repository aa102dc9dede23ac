//! Prompts and the structured-output schema for P&ID extraction.
//!
//! Every prompt lives here so the extraction contract can be changed in one
//! place and inspected by unit tests without calling a model.
//!
//! Callers can override the system instruction via
//! [`crate::config::AnalysisConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

use serde_json::{json, Value};

/// System instruction: taxonomy of detectable elements and extraction rules.
pub const SYSTEM_INSTRUCTION: &str = r#"You are an expert Piping and Instrumentation Diagram (P&ID) analyzer for UAE industrial sectors (ADNOC/ADPP standards).

CRITICAL MISSION:
Your goal is to digitize the ENTIRE diagram. You must identify EVERY single component, no matter how small.
A typical P&ID contains 20-100 items. If you only find 5-10, you have FAILED.

DETECTION CHECKLIST:
1. Valves: Gate, Globe, Ball, Check, Butterfly, Safety Relief (PSV), Control Valves (CV). Look for every valve symbol on every line.
2. Instruments: All bubbles (circles with letters). PI (Pressure Indicator), TI, TT, PT, LT, LG, FT, FIC, PIC.
3. Equipment: Pumps (P-...), Vessels (V-...), Tanks (T-...), Heat Exchangers (E-...).
4. Piping Components: Flanges, Reducers, Spectacle Blinds, Strainers.
5. Line Numbers: If a line number is distinct, treat it as a component if relevant for maintenance.

DATA EXTRACTION RULES:
- ID: OCR the text tag exactly (e.g. "HV-101", "P-1002A"). If the text is rotated or vertically oriented, read it carefully. If no tag exists, create a descriptive ID (e.g. "VALVE-LINE-01").
- Coordinates: X/Y percentages (0-100) where (0,0) is Top-Left and (100,100) is Bottom-Right. Be precise.
- initialStatus: one of OPERATIONAL, MAINTENANCE_REQUIRED, CRITICAL_REPAIR, UNKNOWN, judged from markings, notes and revision clouds.
- UAE Standards: Add a relevant maintenance note for the UAE climate (high heat/humidity/sand/salinity).

Output must be a JSON array."#;

/// User instruction sent alongside the diagram image.
pub const EXTRACTION_PROMPT: &str = "Scan this P&ID image pixel-by-pixel. List EVERY component found. Do not summarize. I expect a complete inventory of Valves, Instruments, and Equipment with precise coordinates.";

/// Fields the schema marks as required on every component.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "id",
    "type",
    "coordinates",
    "initialStatus",
    "uaeStandardNote",
];

/// Structured-output schema: an array of component objects.
///
/// Uses the OpenAPI subset understood by Gemini's `responseSchema`.
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": { "type": "STRING" },
                "type": { "type": "STRING" },
                "label": { "type": "STRING" },
                "description": { "type": "STRING" },
                "coordinates": {
                    "type": "OBJECT",
                    "properties": {
                        "x": { "type": "NUMBER", "description": "X percentage 0-100 from left" },
                        "y": { "type": "NUMBER", "description": "Y percentage 0-100 from top" }
                    },
                    "required": ["x", "y"]
                },
                "initialStatus": {
                    "type": "STRING",
                    "enum": ["OPERATIONAL", "MAINTENANCE_REQUIRED", "CRITICAL_REPAIR", "UNKNOWN"]
                },
                "uaeStandardNote": {
                    "type": "STRING",
                    "description": "Compliance note based on UAE standards"
                }
            },
            "required": REQUIRED_FIELDS
        }
    })
}

/// System instruction for backends without a structured-output channel.
///
/// The schema is appended as plain text so the model still sees the shape.
pub fn system_instruction_with_schema(base: &str) -> String {
    let schema = serde_json::to_string_pretty(&response_schema()).unwrap_or_default();
    format!(
        "{base}\n\nRespond with ONLY a JSON array (no prose, no code fences) matching this schema:\n{schema}"
    )
}
