//! Alert lifecycle manager: the sole writer of alert state.
//!
//! Raising, resolving and closing all flow through here, which persists the
//! change, fans it out to the plugin registry, and invokes the external push
//! callback for live listeners. A process-wide session id is generated at
//! construction and scopes "this run's" alerts.

use crate::plugins::PluginRegistry;
use chrono::Utc;
use netwarden_common::{Alert, AlertCategory, AlertLevel, Database, WardenError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type PushCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// A request to raise an alert.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub category: AlertCategory,
    pub level: AlertLevel,
    pub message: String,
    pub auto_dismiss_after: Option<Duration>,
    pub network_id: Option<i64>,
    pub session_id: Option<String>,
    pub check_duplicate: bool,
}

impl AlertRequest {
    pub fn new(category: AlertCategory, level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            category,
            level,
            message: message.into(),
            auto_dismiss_after: None,
            network_id: None,
            session_id: None,
            check_duplicate: false,
        }
    }

    pub fn auto_dismiss_after(mut self, after: Duration) -> Self {
        self.auto_dismiss_after = Some(after);
        self
    }

    pub fn network_id(mut self, id: i64) -> Self {
        self.network_id = Some(id);
        self
    }

    pub fn session_id(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }

    pub fn deduplicated(mut self) -> Self {
        self.check_duplicate = true;
        self
    }
}

struct Inner {
    db: Database,
    registry: Arc<PluginRegistry>,
    push: Option<PushCallback>,
    session: String,
}

#[derive(Clone)]
pub struct AlertManager {
    inner: Arc<Inner>,
}

impl AlertManager {
    pub fn new(db: Database, registry: Arc<PluginRegistry>, push: Option<PushCallback>) -> Self {
        let session = Uuid::new_v4().to_string();
        info!("Alert manager session {session}");
        Self {
            inner: Arc::new(Inner {
                db,
                registry,
                push,
                session,
            }),
        }
    }

    /// The process-wide session id used for alerts raised without an
    /// explicit session.
    pub fn session(&self) -> &str {
        &self.inner.session
    }

    /// Raise an alert. With `check_duplicate` set, an unresolved alert with
    /// the same `(category, message)` in the requested session is returned
    /// unmodified instead of creating a new one.
    pub fn raise(&self, request: AlertRequest) -> Result<Alert, WardenError> {
        let session = request
            .session_id
            .clone()
            .unwrap_or_else(|| self.inner.session.clone());

        if request.check_duplicate {
            if let Some(existing) =
                self.find_unresolved_in(request.category, &request.message, &session)?
            {
                debug!(
                    "Duplicate unresolved alert #{:?} for [{}] {}",
                    existing.id, request.category, request.message
                );
                return Ok(existing);
            }
        }

        let mut alert = Alert::new(request.category, request.level, request.message);
        alert.auto_dismiss_secs = request.auto_dismiss_after.map(|d| d.as_secs_f64());
        alert.network_id = request.network_id;
        alert.session_id = Some(session);

        let id = self.inner.db.insert_alert(&alert)?;
        alert.id = Some(id);
        info!("Alert #{id} raised: [{}] {}", alert.category, alert.message);

        self.inner.registry.on_alerting(&alert);
        if let Some(push) = &self.inner.push {
            push(&alert);
        }

        if let Some(after) = request.auto_dismiss_after {
            self.schedule_auto_dismiss(alert.clone(), after);
        }

        Ok(alert)
    }

    /// Raise from a JSON-like payload (`type`, `message`, optional `level`,
    /// `autodismisses_after`, `network_id`, `session_id`).
    pub fn raise_from_data(
        &self,
        data: &serde_json::Value,
        check_duplicate: bool,
    ) -> Result<Alert, WardenError> {
        let category: AlertCategory = data
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .parse()?;
        let level: AlertLevel = data
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info")
            .parse()?;
        let message = data
            .get("message")
            .and_then(|v| v.as_str())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                WardenError::Validation(
                    "Alert message must be provided under the key 'message'".to_string(),
                )
            })?;

        let mut request = AlertRequest::new(category, level, message);
        request.check_duplicate = check_duplicate;
        if let Some(secs) = data.get("autodismisses_after").and_then(|v| v.as_f64()) {
            if secs < 0.0 {
                return Err(WardenError::Validation(format!(
                    "autodismisses_after must be non-negative, got {secs}"
                )));
            }
            request.auto_dismiss_after = Some(Duration::from_secs_f64(secs));
        }
        request.network_id = data.get("network_id").and_then(|v| v.as_i64());
        request.session_id = data
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        self.raise(request)
    }

    /// Mark resolved, stamp the resolution time, persist, fan out, push.
    /// Resolving an already-resolved alert is a harmless no-op update, which
    /// is what late auto-dismiss timers rely on.
    pub fn resolve(&self, alert: &Alert) -> Result<Alert, WardenError> {
        let id = alert.id.ok_or(WardenError::NotPersisted)?;

        let mut resolved = alert.clone();
        let resolved_at = Utc::now();
        resolved.is_resolved = true;
        resolved.resolved_at = Some(resolved_at);
        self.inner.db.resolve_alert(id, resolved_at)?;
        info!("Alert #{id} resolved: [{}] {}", resolved.category, resolved.message);

        self.inner.registry.on_alert_resolved(&resolved);
        if let Some(push) = &self.inner.push {
            push(&resolved);
        }
        Ok(resolved)
    }

    /// Delete the alert from storage entirely. Closed alerts are purged;
    /// resolved alerts remain queryable history.
    pub fn close(&self, alert: &Alert) -> Result<(), WardenError> {
        let id = alert.id.ok_or(WardenError::NotPersisted)?;

        self.inner.db.delete_alert(id)?;
        info!("Alert #{id} closed: [{}] {}", alert.category, alert.message);

        self.inner.registry.on_alert_closed(alert);
        if let Some(push) = &self.inner.push {
            push(alert);
        }
        Ok(())
    }

    /// The most recent unresolved alert matching `(category, message)` in
    /// the current session.
    pub fn find_unresolved(
        &self,
        category: AlertCategory,
        message: &str,
    ) -> Result<Option<Alert>, WardenError> {
        self.find_unresolved_in(category, message, &self.inner.session)
    }

    fn find_unresolved_in(
        &self,
        category: AlertCategory,
        message: &str,
        session: &str,
    ) -> Result<Option<Alert>, WardenError> {
        let alerts = self.inner.db.get_alerts(None, true, false, Some(session))?;
        Ok(alerts.into_iter().find(|a| a.matches(category, message)))
    }

    /// Query alerts newest-first. Contradictory resolution filters apply no
    /// resolution filter at all.
    pub fn get_alerts(
        &self,
        limit: Option<u32>,
        only_unresolved: bool,
        only_resolved: bool,
        this_session_only: bool,
    ) -> Result<Vec<Alert>, WardenError> {
        let session = this_session_only.then(|| self.inner.session.as_str());
        self.inner
            .db
            .get_alerts(limit, only_unresolved, only_resolved, session)
    }

    /// One-shot timer, keyed to this alert instance, never cancelled. If the
    /// alert is resolved or closed first, the late resolve is redundant.
    fn schedule_auto_dismiss(&self, alert: Alert, after: Duration) {
        let manager = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(after);
            if let Err(e) = manager.resolve(&alert) {
                warn!("Auto-dismiss of alert #{:?} failed: {e}", alert.id);
            }
        });
    }
}
