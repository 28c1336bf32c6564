//! Operator-visible alert model.
//!
//! An alert is unpersisted until storage assigns it an id. The triple
//! `(category, message, session_id)` is the deduplication key: at most one
//! unresolved alert may exist per key per session when creation requests
//! deduplication.

use crate::error::WardenError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    General,
    Network,
    Security,
    Battery,
    Power,
    Interface,
    Temperature,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Network => "network",
            Self::Security => "security",
            Self::Battery => "battery",
            Self::Power => "power",
            Self::Interface => "interface",
            Self::Temperature => "temperature",
        }
    }

    pub fn all() -> &'static [AlertCategory] {
        &[
            Self::General,
            Self::Network,
            Self::Security,
            Self::Battery,
            Self::Power,
            Self::Interface,
            Self::Temperature,
        ]
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "network" => Ok(Self::Network),
            "security" => Ok(Self::Security),
            "battery" => Ok(Self::Battery),
            "power" => Ok(Self::Power),
            "interface" => Ok(Self::Interface),
            "temperature" => Ok(Self::Temperature),
            other => Err(WardenError::Validation(format!(
                "Invalid alert category: {other}. Expected one of {:?}",
                AlertCategory::all()
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(WardenError::Validation(format!(
                "Invalid alert level: {other}. Expected one of [\"info\", \"warning\", \"critical\"]"
            ))),
        }
    }
}

/// An operator-visible condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by storage on first persistence; None before that.
    pub id: Option<i64>,
    pub category: AlertCategory,
    pub level: AlertLevel,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Seconds after which the alert resolves itself, if set. Not persisted.
    #[serde(rename = "autodismisses_after")]
    pub auto_dismiss_secs: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub network_id: Option<i64>,
    pub session_id: Option<String>,
}

impl Alert {
    pub fn new(category: AlertCategory, level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            id: None,
            category,
            level,
            message: message.into(),
            is_resolved: false,
            resolved_at: None,
            auto_dismiss_secs: None,
            timestamp: Utc::now(),
            network_id: None,
            session_id: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "category": self.category.as_str(),
            "level": self.level.as_str(),
            "message": self.message,
            "is_resolved": self.is_resolved,
            "resolved_at": self.resolved_at.map(|t| t.to_rfc3339()),
            "autodismisses_after": self.auto_dismiss_secs,
            "timestamp": self.timestamp.to_rfc3339(),
            "network_id": self.network_id,
            "session_id": self.session_id,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, WardenError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Whether this alert matches the deduplication key of another request.
    pub fn matches(&self, category: AlertCategory, message: &str) -> bool {
        self.category == category && self.message == message
    }
}
