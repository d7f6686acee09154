use crate::app::ports::ObservabilitySink;
use crate::constants::STATUS_TARGET;
use crate::error::RunError;
use crate::pipeline::RunReport;
use metrics::{counter, gauge};
use std::net::SocketAddr;
use tracing::{error, info, warn};

pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    info!("[metrics] Attempting to install Prometheus exporter on {}", addr);
    match builder.install() {
        Ok(()) => {
            info!("[metrics] Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("[metrics] Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

/// Logs each run's counters to the status target and records them as
/// Prometheus counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record_run(&self, report: &RunReport) {
        info!(
            target: STATUS_TARGET,
            run_id = %report.run_id,
            source = %report.source_name,
            sha256 = report.payload_sha256.as_deref().unwrap_or("-"),
            rows_decoded = report.rows_decoded,
            empty_rows_dropped = report.empty_rows_dropped,
            missing_key_dropped = report.missing_key_dropped,
            duplicate_keys = report.duplicate_keys,
            records_written = report.records_written,
            rows_purged = report.rows_purged,
            "run counters"
        );

        counter!("medsupply_runs_total").increment(1);
        counter!("medsupply_rows_decoded_total").increment(report.rows_decoded as u64);
        counter!("medsupply_empty_rows_dropped_total").increment(report.empty_rows_dropped as u64);
        counter!("medsupply_missing_key_dropped_total").increment(report.missing_key_dropped as u64);
        counter!("medsupply_duplicate_keys_total").increment(report.duplicate_keys as u64);
        counter!("medsupply_records_written_total").increment(report.records_written as u64);
        counter!("medsupply_rows_purged_total").increment(report.rows_purged);
        if let Some(at) = report.executed_at {
            gauge!("medsupply_last_commit_timestamp_seconds").set(at.timestamp() as f64);
        }
    }

    fn record_failure(&self, report: &RunReport, error: &RunError) {
        error!(
            target: STATUS_TARGET,
            run_id = %report.run_id,
            source = %error.source_name,
            step = %error.step,
            error = %error.error,
            "run failed"
        );
        counter!("medsupply_run_failures_total", "step" => error.step.as_str()).increment(1);
    }
}
