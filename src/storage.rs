//! Persistence boundary for finished analyses.
//!
//! The session only needs an acknowledgment: an identifier, a timestamp and
//! a synced flag. [`SimulatedStore`] stands in for a database with a fixed
//! latency and a log line per insert.

use crate::error::DigitizerError;
use crate::model::{AnalysisResult, StorageAck};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Accepts an analysis and acknowledges it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(
        &self,
        result: &AnalysisResult,
        user_id: Option<&str>,
    ) -> Result<StorageAck, DigitizerError>;
}

/// In-process store with a configurable acknowledgment delay.
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    latency: Duration,
}

impl SimulatedStore {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// Acknowledges immediately.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for SimulatedStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl RecordStore for SimulatedStore {
    async fn save(
        &self,
        result: &AnalysisResult,
        user_id: Option<&str>,
    ) -> Result<StorageAck, DigitizerError> {
        debug!("Connecting to record store (simulated, {:?})", self.latency);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let ack = StorageAck {
            id: Uuid::new_v4(),
            upload_date: Utc::now(),
            pid_data: result.clone(),
            synced: true,
            user_id: user_id.map(str::to_string),
        };
        info!(
            id = %ack.id,
            file = %result.file_name,
            version = result.version,
            components = result.components.len(),
            "INSERT INTO pid_records committed"
        );
        Ok(ack)
    }
}
