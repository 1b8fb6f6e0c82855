use std::sync::Arc;

use crate::alert::TicketWriter;
use crate::config::MonitorConfig;
use crate::detect::incident::IncidentManager;
use crate::monitor::Monitor;
use crate::telemetry::PrometheusMetrics;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub metrics: Arc<PrometheusMetrics>,
    pub tickets: Arc<TicketWriter>,
    pub incidents: IncidentManager,
    pub config: Arc<MonitorConfig>,
}
