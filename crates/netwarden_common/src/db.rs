//! SQLite storage layer.
//!
//! Storage is a shared resource accessed through short-lived connections,
//! one per operation; no transaction spans multiple logical operations.
//! Cross-operation atomicity (check-then-insert deduplication) is therefore
//! provided by the orchestrator serializing its own calls, not by the
//! database.
//!
//! Schema changes are additive-only: `init` adds missing columns, never
//! drops or renames.

use crate::alert::{Alert, AlertCategory, AlertLevel};
use crate::error::WardenError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A known network, keyed by gateway MAC address.
#[derive(Debug, Clone)]
pub struct NetworkRecord {
    pub id: i64,
    pub mac_address: String,
    pub is_blacklisted: bool,
    pub is_home: bool,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

/// A host discovered on a scanned network.
#[derive(Debug, Clone, Default)]
pub struct DeviceRecord {
    pub ip_address: String,
    pub mac_address: String,
    pub hostname: String,
    pub services: String,
    pub vendor: String,
    pub deviceclass: String,
    pub network_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection, WardenError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Create the schema if absent and add any missing columns.
    pub fn init(&self) -> Result<(), WardenError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS networks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT UNIQUE,
                is_blacklisted BOOLEAN,
                is_home BOOLEAN,
                first_seen DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_seen DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip_address TEXT,
                mac_address TEXT,
                hostname TEXT,
                services TEXT,
                vendor TEXT,
                deviceclass TEXT,
                network_id INTEGER,
                FOREIGN KEY(network_id) REFERENCES networks(id)
            );

            CREATE TABLE IF NOT EXISTS plugin_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plugin_name TEXT,
                event TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message TEXT,
                category TEXT,
                level TEXT,
                is_resolved BOOLEAN,
                resolved_at DATETIME,
                network_id INTEGER,
                session_id TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        ensure_columns(
            &conn,
            "networks",
            &[
                ("mac_address", "TEXT UNIQUE"),
                ("is_blacklisted", "BOOLEAN"),
                ("is_home", "BOOLEAN"),
                ("first_seen", "DATETIME DEFAULT CURRENT_TIMESTAMP"),
                ("last_seen", "DATETIME DEFAULT CURRENT_TIMESTAMP"),
            ],
        )?;
        ensure_columns(
            &conn,
            "devices",
            &[
                ("ip_address", "TEXT"),
                ("mac_address", "TEXT"),
                ("hostname", "TEXT"),
                ("services", "TEXT"),
                ("vendor", "TEXT"),
                ("deviceclass", "TEXT"),
                ("network_id", "INTEGER"),
            ],
        )?;
        ensure_columns(
            &conn,
            "plugin_logs",
            &[
                ("plugin_name", "TEXT"),
                ("event", "TEXT"),
                ("timestamp", "DATETIME DEFAULT CURRENT_TIMESTAMP"),
            ],
        )?;
        ensure_columns(
            &conn,
            "alerts",
            &[
                ("message", "TEXT"),
                ("category", "TEXT"),
                ("level", "TEXT"),
                ("is_resolved", "BOOLEAN"),
                ("resolved_at", "DATETIME"),
                ("network_id", "INTEGER"),
                ("session_id", "TEXT"),
                ("timestamp", "DATETIME DEFAULT CURRENT_TIMESTAMP"),
            ],
        )?;

        debug!("Database schema ready at {}", self.path.display());
        Ok(())
    }

    // ── Alerts ──────────────────────────────────────────────────────────

    /// Persist a new alert and return its assigned id.
    pub fn insert_alert(&self, alert: &Alert) -> Result<i64, WardenError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (message, category, level, is_resolved, resolved_at, network_id, session_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.message,
                alert.category.as_str(),
                alert.level.as_str(),
                alert.is_resolved as i64,
                alert.resolved_at.map(|t| t.to_rfc3339()),
                alert.network_id,
                alert.session_id,
                alert.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark an alert resolved and stamp the resolution time.
    pub fn resolve_alert(&self, alert_id: i64, resolved_at: DateTime<Utc>) -> Result<(), WardenError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE alerts SET is_resolved = 1, resolved_at = ?1 WHERE id = ?2",
            params![resolved_at.to_rfc3339(), alert_id],
        )?;
        Ok(())
    }

    /// Remove an alert entirely. Closed alerts are purged, not kept as history.
    pub fn delete_alert(&self, alert_id: i64) -> Result<(), WardenError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM alerts WHERE id = ?1", params![alert_id])?;
        Ok(())
    }

    /// Fetch alerts newest-first, with optional filters.
    ///
    /// Requesting both `only_unresolved` and `only_resolved` applies neither
    /// filter; the contradictory combination reads as "no resolution filter".
    pub fn get_alerts(
        &self,
        limit: Option<u32>,
        only_unresolved: bool,
        only_resolved: bool,
        session_id: Option<&str>,
    ) -> Result<Vec<Alert>, WardenError> {
        let conn = self.conn()?;
        let mut query = String::from(
            "SELECT id, message, category, level, is_resolved, resolved_at, network_id, session_id, timestamp FROM alerts",
        );
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if only_unresolved && !only_resolved {
            conditions.push("is_resolved = 0".to_string());
        } else if only_resolved && !only_unresolved {
            conditions.push("is_resolved = 1".to_string());
        }
        if let Some(session) = session_id {
            conditions.push(format!("session_id = ?{}", args.len() + 1));
            args.push(Box::new(session.to_string()));
        }
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY timestamp DESC, id DESC");
        if let Some(n) = limit {
            query.push_str(&format!(" LIMIT ?{}", args.len() + 1));
            args.push(Box::new(n));
        }

        let mut stmt = conn.prepare(&query)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut alerts = Vec::new();
        for row in rows {
            let (id, message, category, level, is_resolved, resolved_at, network_id, session, timestamp) = row?;
            alerts.push(Alert {
                id: Some(id),
                category: category.parse::<AlertCategory>()?,
                level: level.parse::<AlertLevel>()?,
                message,
                is_resolved: is_resolved != 0,
                resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
                auto_dismiss_secs: None,
                timestamp: parse_timestamp(&timestamp)?,
                network_id,
                session_id: session,
            });
        }
        Ok(alerts)
    }

    // ── Networks ────────────────────────────────────────────────────────

    /// Insert a new network or refresh an existing one by MAC address.
    /// Updates bump `last_seen`; networks are never deleted.
    pub fn upsert_network(
        &self,
        mac_address: &str,
        is_blacklisted: bool,
        is_home: bool,
    ) -> Result<i64, WardenError> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM networks WHERE mac_address = ?1",
                params![mac_address],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            None => {
                conn.execute(
                    "INSERT INTO networks (mac_address, is_blacklisted, is_home) VALUES (?1, ?2, ?3)",
                    params![mac_address, is_blacklisted as i64, is_home as i64],
                )?;
                Ok(conn.last_insert_rowid())
            }
            Some(id) => {
                conn.execute(
                    "UPDATE networks
                     SET is_blacklisted = ?1, is_home = ?2, last_seen = CURRENT_TIMESTAMP
                     WHERE mac_address = ?3",
                    params![is_blacklisted as i64, is_home as i64, mac_address],
                )?;
                Ok(id)
            }
        }
    }

    pub fn network_by_mac(&self, mac_address: &str) -> Result<Option<NetworkRecord>, WardenError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, mac_address, is_blacklisted, is_home, first_seen, last_seen
                 FROM networks WHERE mac_address = ?1",
                params![mac_address],
                |row| {
                    Ok(NetworkRecord {
                        id: row.get(0)?,
                        mac_address: row.get(1)?,
                        is_blacklisted: row.get::<_, i64>(2)? != 0,
                        is_home: row.get::<_, i64>(3)? != 0,
                        first_seen: row.get(4)?,
                        last_seen: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Check that a network id exists. Used to validate PERFORM_ACTION
    /// requests before dispatch.
    pub fn network_id_exists(&self, network_id: i64) -> Result<bool, WardenError> {
        let conn = self.conn()?;
        let row: Option<i64> = conn
            .query_row(
                "SELECT id FROM networks WHERE id = ?1",
                params![network_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    // ── Devices ─────────────────────────────────────────────────────────

    pub fn insert_device(&self, device: &DeviceRecord) -> Result<i64, WardenError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO devices (ip_address, mac_address, hostname, services, vendor, deviceclass, network_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                device.ip_address,
                device.mac_address,
                device.hostname,
                device.services,
                device.vendor,
                device.deviceclass,
                device.network_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Plugin logs ─────────────────────────────────────────────────────

    /// Record a plugin event for diagnostics and action auditing.
    pub fn log_plugin_event(&self, plugin_name: &str, event: &str) -> Result<(), WardenError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO plugin_logs (plugin_name, event) VALUES (?1, ?2)",
            params![plugin_name, event],
        )?;
        Ok(())
    }

    pub fn plugin_log_count(&self, plugin_name: &str) -> Result<u64, WardenError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plugin_logs WHERE plugin_name = ?1",
            params![plugin_name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, WardenError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WardenError::Validation(format!("Bad timestamp '{raw}' in database: {e}")))
}

/// Add any missing columns to `table`. SQLite's ALTER TABLE only supports
/// adding columns, which is exactly the additive-only contract we want.
fn ensure_columns(
    conn: &Connection,
    table: &str,
    expected: &[(&str, &str)],
) -> Result<(), WardenError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: HashSet<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    for (name, definition) in expected {
        if !existing.contains(*name) {
            debug!("Adding missing column {table}.{name}");
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {name} {definition}"))?;
        }
    }
    Ok(())
}
