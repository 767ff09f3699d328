//! Runtime configuration for the reconciliation engine.

use crate::error::{Error, Result};
use std::env;

/// Configuration passed explicitly to the engine and façade constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacConfig {
    /// Publish a member-role event whenever a role's labels change.
    pub notify_label_changes: bool,
    /// Name reported as the event source.
    pub service_name: String,
    /// Topic member-role events are published to.
    pub member_role_topic: String,
    /// Event type used for label changes.
    pub label_event_type: String,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            notify_label_changes: false,
            service_name: "iam-service".to_string(),
            member_role_topic: "memberRole".to_string(),
            label_event_type: "updateMemberRole".to_string(),
        }
    }
}

impl RbacConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// - `RBAC_NOTIFY_LABEL_CHANGES`: `true`/`false`/`1`/`0` (default `false`)
    /// - `RBAC_SERVICE_NAME`: event source name (default `iam-service`)
    /// - `RBAC_MEMBER_ROLE_TOPIC`: event topic (default `memberRole`)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var("RBAC_NOTIFY_LABEL_CHANGES") {
            config.notify_label_changes = parse_flag("RBAC_NOTIFY_LABEL_CHANGES", &value)?;
        }
        if let Ok(value) = env::var("RBAC_SERVICE_NAME") {
            config.service_name = value;
        }
        if let Ok(value) = env::var("RBAC_MEMBER_ROLE_TOPIC") {
            config.member_role_topic = value;
        }

        Ok(config)
    }

    /// Enable or disable label-change notifications.
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify_label_changes = enabled;
        self
    }

    /// Set the event source name.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }
}

fn parse_flag(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::InvalidConfiguration(format!(
            "{var} must be a boolean, got '{other}'"
        ))),
    }
}
