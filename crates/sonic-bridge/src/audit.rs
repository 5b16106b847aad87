//! Structured logging and audit records for bridge administration.
//!
//! Control-plane changes (ports joining or leaving, spanning-tree state,
//! port flags, multicast membership, hardware block rules) are recorded as
//! [`AuditRecord`]s and emitted through [`audit_log!`] on the `audit`
//! tracing target. Data-path events use the plain `*_log!` macros, which
//! tag every event with a `source` field naming the emitting component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Port added to or removed from the bridge
    PortLifecycle,
    /// Spanning-tree state or port flag change
    PortConfig,
    /// Multicast group membership or router-port change
    GroupMembership,
    /// Hardware multicast table programming
    HardwareOffload,
    /// Bridge construction and configuration
    SystemLifecycle,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditCategory::PortLifecycle => "PORT_LIFECYCLE",
            AuditCategory::PortConfig => "PORT_CONFIG",
            AuditCategory::GroupMembership => "GROUP_MEMBERSHIP",
            AuditCategory::HardwareOffload => "HARDWARE_OFFLOAD",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
        };
        f.write_str(s)
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// One audit event. Built with the `with_*` methods, then handed to
/// [`audit_log!`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Emitting component, e.g. "PortTable" or "UnknownMulticastLimiter".
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,

    /// Affected object, e.g. a port name or a flow key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time. The outcome starts
    /// as `InProgress`.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the outcome as `Failure`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level event tagged with its source component.
///
/// ```ignore
/// debug_log!("FanoutEngine", port = %name, "clone failed");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`] on the `audit` target.
///
/// Success is logged at info, in-progress at debug, failure and denial at
/// warn.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON tracing subscriber filtered by `RUST_LOG`, falling back
/// to `log_level`.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Human-readable variant of [`init_logging`] for development.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::PortLifecycle, "PortTable", "add_port")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("eth0")
            .with_object_type("bridge_port");

        assert_eq!(record.category, AuditCategory::PortLifecycle);
        assert_eq!(record.source, "PortTable");
        assert_eq!(record.action, "add_port");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("eth0".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(
            AuditCategory::HardwareOffload,
            "HardwareOffloadBridge",
            "block_flow",
        )
        .with_error("hardware table full");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("hardware table full"));
    }

    #[test]
    fn test_audit_record_json() {
        let record = AuditRecord::new(
            AuditCategory::GroupMembership,
            "MulticastGroupIndex",
            "update_membership",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({ "members": 5 }));

        let json = record.to_json();
        assert!(json.contains("GROUP_MEMBERSHIP"));
        assert!(json.contains("update_membership"));
        assert!(json.contains("\"members\":5"));
        assert!(!json.contains("object_id"));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::HardwareOffload.to_string(), "HARDWARE_OFFLOAD");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }
}
