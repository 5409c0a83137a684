//! `OperationResult` / `GroupResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The outcome of one leaf operation against one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub device_id: String,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub request_summary: String,
    pub response_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub reboot_required: bool,
    /// Non-empty when the device accepted a write but silently clamped the
    /// value to its own valid range (round-trip property).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl OperationResult {
    pub fn success(device_id: impl Into<String>, request_summary: impl Into<String>, response_summary: impl Into<String>, duration: Duration) -> Self {
        Self {
            device_id: device_id.into(),
            success: true,
            attempted_at: Utc::now(),
            duration,
            request_summary: request_summary.into(),
            response_summary: response_summary.into(),
            error_kind: None,
            error_message: None,
            reboot_required: false,
            warning: None,
        }
    }

    pub fn failure(
        device_id: impl Into<String>,
        request_summary: impl Into<String>,
        duration: Duration,
        error: &crate::error::FleetError,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            success: false,
            attempted_at: Utc::now(),
            duration,
            request_summary: request_summary.into(),
            response_summary: String::new(),
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
            reboot_required: false,
            warning: None,
        }
    }

    pub fn with_reboot_required(mut self, reboot_required: bool) -> Self {
        self.reboot_required = reboot_required;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Aggregate result of fanning a logical request out across a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub results: Vec<OperationResult>,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
}

impl GroupResult {
    /// Build the aggregate from per-device results, counting a result with
    /// `error_kind == "unknown-device"` as skipped rather than failed.
    pub fn from_results(results: Vec<OperationResult>) -> Self {
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut skipped_count = 0;
        for r in &results {
            if r.success {
                success_count += 1;
            } else if r.error_kind.as_deref() == Some("unknown-device") {
                skipped_count += 1;
            } else {
                failure_count += 1;
            }
        }
        Self {
            results,
            success_count,
            failure_count,
            skipped_count,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;

    #[test]
    fn aggregate_counts_partial_failure() {
        let a = OperationResult::success("A", "toggle", "ok", Duration::from_millis(5));
        let b = OperationResult::failure("B", "toggle", Duration::from_millis(5), &FleetError::Unreachable("B".into()));
        let c = OperationResult::success("C", "toggle", "ok", Duration::from_millis(5));
        let agg = GroupResult::from_results(vec![a, b, c]);
        assert_eq!(agg.success_count, 2);
        assert_eq!(agg.failure_count, 1);
        assert_eq!(agg.skipped_count, 0);
    }

    #[test]
    fn aggregate_counts_unknown_device_as_skipped() {
        let unknown = OperationResult::failure("Z", "toggle", Duration::from_millis(0), &FleetError::UnknownDevice("Z".into()));
        let agg = GroupResult::from_results(vec![unknown]);
        assert_eq!(agg.skipped_count, 1);
        assert_eq!(agg.failure_count, 0);
    }
}
