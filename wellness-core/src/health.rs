//! Health check types
//!
//! Each backing store reports a [`HealthCheck`]; a [`HealthReport`] folds
//! them into one status. Only the system of record is critical: losing a
//! derived store or the broker degrades the service but writes still land.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COMPONENT_SYSTEM_OF_RECORD: &str = "system_of_record";
pub const COMPONENT_CACHE: &str = "cache";
pub const COMPONENT_SEARCH_INDEX: &str = "search_index";
pub const COMPONENT_BROKER: &str = "broker";

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            response_time_ms: None,
            metadata: None,
        }
    }

    /// Create a degraded check result.
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    /// Create an unhealthy check result.
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Aggregated readiness of the whole service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub checked_at: Timestamp,
}

impl HealthReport {
    /// Fold component checks: healthy when all pass, unhealthy when the
    /// system of record fails, degraded otherwise.
    pub fn from_checks(checks: Vec<HealthCheck>, checked_at: Timestamp) -> Self {
        let status = if checks.iter().all(HealthCheck::is_healthy) {
            HealthStatus::Healthy
        } else if checks
            .iter()
            .any(|c| c.component == COMPONENT_SYSTEM_OF_RECORD && !c.is_healthy())
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            checks,
            checked_at,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn all_healthy() -> Vec<HealthCheck> {
        vec![
            HealthCheck::healthy(COMPONENT_SYSTEM_OF_RECORD),
            HealthCheck::healthy(COMPONENT_CACHE),
            HealthCheck::healthy(COMPONENT_SEARCH_INDEX),
            HealthCheck::healthy(COMPONENT_BROKER),
        ]
    }

    #[test]
    fn test_report_healthy_when_all_pass() {
        let report = HealthReport::from_checks(all_healthy(), Utc::now());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.is_healthy());
    }

    #[test]
    fn test_report_degraded_on_derived_store_failure() {
        let mut checks = all_healthy();
        checks[2] = HealthCheck::unhealthy(COMPONENT_SEARCH_INDEX, "connection refused");
        let report = HealthReport::from_checks(checks, Utc::now());
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_report_unhealthy_on_system_of_record_failure() {
        let mut checks = all_healthy();
        checks[0] = HealthCheck::unhealthy(COMPONENT_SYSTEM_OF_RECORD, "timeout");
        checks[1] = HealthCheck::unhealthy(COMPONENT_CACHE, "timeout");
        let report = HealthReport::from_checks(checks, Utc::now());
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_check_serialization_skips_empty_fields() {
        let check = HealthCheck::healthy(COMPONENT_CACHE).with_response_time(3);
        let json = serde_json::to_value(&check).expect("serialize should succeed");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["response_time_ms"], 3);
        assert!(json.get("message").is_none());

        let check = check.with_metadata("backend", serde_json::json!("redis"));
        assert_eq!(
            check.metadata.as_ref().and_then(|m| m.get("backend")),
            Some(&serde_json::json!("redis"))
        );
    }
}
