use crate::alert::{AlertDispatcher, AlertError};
use crate::detect::{AlertEvent, Incident, Severity};
use crate::storage::Pool;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

pub const SLO_BREACH_VERDICT: &str = "SLO Breach: High p95 latency";

/// Persists alerts as incidents in SQLite.
#[derive(Clone)]
pub struct IncidentManager {
    pool: Pool,
}

impl IncidentManager {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn record_incident(
        &self,
        id: Uuid,
        verdict: &str,
        severity: Severity,
        evidence: serde_json::Value,
    ) -> Result<Uuid> {
        let conn = self.pool.get()?;
        let severity_str = format!("{:?}", severity); // Info, Warning, Critical
        let evidence_json = serde_json::to_string(&evidence)?;

        conn.execute(
            "INSERT INTO incidents (id, severity, verdict, evidence_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.to_string(), severity_str, verdict, evidence_json, Utc::now().to_rfc3339()],
        )?;

        Ok(id)
    }

    pub fn record_alert(&self, event: &AlertEvent) -> Result<Uuid> {
        self.record_incident(
            event.id,
            SLO_BREACH_VERDICT,
            Severity::Critical,
            serde_json::to_value(event)?,
        )
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<Incident>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, severity, verdict, evidence_json, created_at FROM incidents ORDER BY created_at DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            let id_str: String = row.get(0)?;
            let sev_str: String = row.get(1)?;
            let severity = match sev_str.as_str() {
                "Critical" => Severity::Critical,
                "Warning" => Severity::Warning,
                _ => Severity::Info,
            };
            let evidence_str: String = row.get(3)?;
            let created_str: String = row.get(4)?;

            Ok(Incident {
                id: Uuid::parse_str(&id_str).unwrap_or_default(),
                severity,
                verdict: row.get(2)?,
                evidence: serde_json::from_str(&evidence_str).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_str)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })?;

        let mut incidents = Vec::new();
        for r in rows {
            incidents.push(r?);
        }
        Ok(incidents)
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for IncidentManager {
    fn name(&self) -> &'static str {
        "incidents"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let manager = self.clone();
        let event = event.clone();
        tokio::task::spawn_blocking(move || manager.record_alert(&event))
            .await
            .map_err(|e| AlertError::Store(e.to_string()))?
            .map(|_| ())
            .map_err(|e| AlertError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::TriggerReason;

    fn manager() -> (tempfile::TempDir, IncidentManager) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::storage::open_pool(dir.path().join("incidents.db")).unwrap();
        (dir, IncidentManager::new(pool))
    }

    #[tokio::test]
    async fn test_alert_recorded_as_incident() {
        let (_dir, incidents) = manager();
        let event = AlertEvent {
            id: Uuid::new_v4(),
            window_start: Utc::now() - chrono::Duration::minutes(5),
            window_end: Utc::now(),
            trigger_reason: TriggerReason::LocalSloBreach,
            breach_count: 11,
        };

        incidents.notify(&event).await.unwrap();

        let recent = incidents.list_recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, event.id);
        assert_eq!(recent[0].severity, Severity::Critical);
        assert_eq!(recent[0].verdict, SLO_BREACH_VERDICT);
        assert_eq!(recent[0].evidence["breach_count"], 11);
        assert_eq!(recent[0].evidence["trigger_reason"], "local_slo_breach");
    }

    #[test]
    fn test_list_recent_respects_limit() {
        let (_dir, incidents) = manager();
        for i in 0..5 {
            incidents
                .record_incident(
                    Uuid::new_v4(),
                    "Manual",
                    Severity::Info,
                    serde_json::json!({ "n": i }),
                )
                .unwrap();
        }
        assert_eq!(incidents.list_recent(3).unwrap().len(), 3);
        assert_eq!(incidents.list_recent(0).unwrap().len(), 0);
        assert_eq!(incidents.list_recent(usize::MAX).unwrap().len(), 5);
    }
}
