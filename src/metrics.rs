use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and register all application metrics.
/// When `listen_addr` is set the exporter serves scrapes itself; otherwise
/// the recorder is installed without an HTTP surface and counters are only
/// visible through logs.
pub fn init_metrics(listen_addr: Option<&str>) -> anyhow::Result<()> {
    match listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr.parse()?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;
        }
        None => {
            let _ = PrometheusBuilder::new().install_recorder()?;
        }
    }

    // Pre-register counters so they appear even before the first increment.
    for chain in ["evm", "solana"] {
        counter!("trades_observed_total", "chain" => chain).absolute(0);
        counter!("trades_duplicate_total", "chain" => chain).absolute(0);
        counter!("trades_executed_total", "chain" => chain).absolute(0);
        counter!("trades_skipped_total", "chain" => chain).absolute(0);
        counter!("trades_failed_total", "chain" => chain).absolute(0);
    }

    Ok(())
}
