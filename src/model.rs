//! Data model: components, analysis results, and versioned upload records.
//!
//! Field names serialise in camelCase so that JSON produced by the model,
//! sent to the store, and printed by the CLI share one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Assessed condition of one facility element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentStatus {
    Operational,
    MaintenanceRequired,
    CriticalRepair,
    #[default]
    Unknown,
}

impl ComponentStatus {
    pub const ALL: [ComponentStatus; 4] = [
        ComponentStatus::Operational,
        ComponentStatus::MaintenanceRequired,
        ComponentStatus::CriticalRepair,
        ComponentStatus::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentStatus::Operational => "OPERATIONAL",
            ComponentStatus::MaintenanceRequired => "MAINTENANCE_REQUIRED",
            ComponentStatus::CriticalRepair => "CRITICAL_REPAIR",
            ComponentStatus::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse: case-insensitive, spaces and hyphens read as underscores.
    /// Returns `None` for anything outside the four defined values.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        Self::ALL.into_iter().find(|s| s.as_str() == norm)
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| {
            format!(
                "unknown status '{s}' (expected one of OPERATIONAL, MAINTENANCE_REQUIRED, CRITICAL_REPAIR, UNKNOWN)"
            )
        })
    }
}

/// Position on the diagram as percentages, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    pub const CENTER: Coordinates = Coordinates { x: 50.0, y: 50.0 };

    /// Build coordinates with both axes clamped to `[0, 100]`.
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Clamp a percentage to `[0, 100]`; NaN falls back to the centre.
pub fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        50.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// One detected facility element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// OCR'd or synthesized tag. Expected unique, not enforced.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub description: String,
    pub coordinates: Coordinates,
    /// What the model assessed.
    pub initial_status: ComponentStatus,
    /// What the user set. The only field mutable after creation.
    pub current_status: ComponentStatus,
    pub uae_standard_note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inspected: Option<String>,
}

/// Output of one full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
    pub components: Vec<Component>,
    pub summary: String,
    pub version: u32,
}

impl AnalysisResult {
    pub fn summarize(component_count: usize) -> String {
        format!("Analyzed {component_count} components according to UAE standards.")
    }
}

/// Acknowledgment returned by the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAck {
    pub id: Uuid,
    pub upload_date: DateTime<Utc>,
    pub pid_data: AnalysisResult,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Immutable snapshot of one completed run, owned by the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,
    pub file_name: String,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub components: Vec<Component>,
    /// Source image as a `data:` URL.
    pub image_preview: String,
    pub summary: String,
    /// Identifier assigned by the store acknowledgment.
    pub storage_id: Uuid,
}

impl UploadRecord {
    /// Finalize a stored analysis into a record with a fresh identity.
    pub fn from_ack(ack: StorageAck, image_preview: String) -> Self {
        let StorageAck { id, pid_data, .. } = ack;
        Self {
            id: Uuid::new_v4(),
            file_name: pid_data.file_name,
            version: pid_data.version,
            timestamp: pid_data.timestamp,
            components: pid_data.components,
            image_preview,
            summary: pid_data.summary,
            storage_id: id,
        }
    }

    pub fn stats(&self) -> InventoryStats {
        InventoryStats::from_components(&self.components)
    }
}

/// Counts over a record's current statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total: usize,
    pub operational: usize,
    /// Everything not operational, `UNKNOWN` included.
    pub maintenance: usize,
}

impl InventoryStats {
    pub fn from_components(components: &[Component]) -> Self {
        let operational = components
            .iter()
            .filter(|c| c.current_status == ComponentStatus::Operational)
            .count();
        Self {
            total: components.len(),
            operational,
            maintenance: components.len() - operational,
        }
    }
}

/// Signed-in user profile returned by the credential boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}
