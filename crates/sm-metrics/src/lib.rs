use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const REFRESH_TOTAL: &str = "studymate_refresh_total";
pub const REFRESH_DURATION_SECONDS: &str = "studymate_refresh_duration_seconds";
pub const REFRESH_SWAP_ATTEMPTS: &str = "studymate_refresh_swap_attempts";
pub const PROFILES_GAUGE: &str = "studymate_profiles";
pub const RECOMMENDATIONS_GAUGE: &str = "studymate_recommendations";

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Starts a Prometheus exporter on `0.0.0.0:<port>`, the port coming from
/// `port_env` or `default_port`. Later calls return the first handle.
///
/// The HTTP listener is spawned onto the current tokio runtime; outside a
/// runtime nothing is installed and `None` is returned.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(metrics_port = port, "no tokio runtime; prometheus exporter not started");
        return None;
    };

    let _entered = runtime.enter();
    let (recorder, exporter) = match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .build()
    {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, metrics_port = port, "metrics recorder already installed");
        return None;
    }

    runtime.spawn(async move {
        if let Err(err) = exporter.await {
            warn!(error = ?err, "prometheus exporter stopped");
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);
    info!(metrics_port = port, "started prometheus exporter");
    PROMETHEUS_HANDLE.get()
}

pub fn record_refresh_success(
    profiles: usize,
    recommendations: usize,
    attempts: u32,
    elapsed: Duration,
) {
    counter!(REFRESH_TOTAL, "outcome" => "success").increment(1);
    histogram!(REFRESH_DURATION_SECONDS).record(elapsed.as_secs_f64());
    histogram!(REFRESH_SWAP_ATTEMPTS).record(f64::from(attempts));
    gauge!(PROFILES_GAUGE).set(profiles as f64);
    gauge!(RECOMMENDATIONS_GAUGE).set(recommendations as f64);
}

/// `kind` is the snake_case failure class, e.g. `unknown_category`.
pub fn record_refresh_failure(kind: &str, elapsed: Duration) {
    counter!(REFRESH_TOTAL, "outcome" => "failure", "kind" => kind.to_string()).increment(1);
    histogram!(REFRESH_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_on_missing_or_bad_values() {
        assert_eq!(resolve_port(None, 9464), 9464);
        assert_eq!(resolve_port(Some("nope".into()), 9464), 9464);
        assert_eq!(resolve_port(Some(" 9100 ".into()), 9464), 9100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exporter_accepts_scrape_connections() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let handle = init_metrics("SM_METRICS_TEST_PORT_UNSET", port);
        assert!(handle.is_some());
        record_refresh_success(2, 2, 1, Duration::from_millis(3));

        let mut connected = false;
        for _ in 0..40 {
            if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
                connected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(connected, "nothing listening on port {port}");
        assert!(handle.unwrap().render().contains(REFRESH_TOTAL));
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        record_refresh_success(3, 6, 1, Duration::from_millis(5));
        record_refresh_failure("unknown_category", Duration::from_millis(1));
    }
}
