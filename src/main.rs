use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linkwatch::config::MonitorConfig;
use linkwatch::detect::Sample;
use linkwatch::probes::{run_latency_bounded, LatencyReport, PingProbe};
use linkwatch::throughput::{format_mbps, run_throughput_bounded, Iperf3Probe};

const DEFAULT_DB_PATH: &str = "data/linkwatch.db";

#[derive(Parser)]
#[command(
    name = "linkwatch",
    about = "Single-link network quality monitor with anomaly scoring and SLO breach alerts",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + probe scheduler + alerting)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// SQLite database for incidents
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: String,
    },

    /// Run one latency + throughput measurement and print the sample
    Probe {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// List recorded incidents
    Incidents {
        /// Maximum number of incidents to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// SQLite database for incidents
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: String,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = MonitorConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Serve { bind, db } => {
            tracing::info!(%bind, target = %config.probe.target_host, "Starting linkwatch daemon");
            linkwatch::serve(config, &bind, &db).await?;
        }
        Commands::Probe { json } => {
            let sample = probe_once(&config).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&sample)?);
            } else {
                println!("\n=== linkwatch probe: {} ===", config.probe.target_host);
                println!("Timestamp:   {}", sample.timestamp.to_rfc3339());
                println!("p95 latency: {:.1} ms", sample.p95_latency_seconds * 1000.0);
                println!("Jitter:      {:.2} ms", sample.jitter_ms);
                println!("Loss:        {:.1} %", sample.loss_pct);
                println!("Throughput:  {}", format_mbps(sample.throughput_mbps));
                println!();
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml().context("failed to render configuration")?);
        }
        Commands::Incidents { limit, db } => {
            let pool = linkwatch::storage::open_pool(&db)?;
            let manager = linkwatch::detect::incident::IncidentManager::new(pool);
            let incidents = manager.list_recent(limit)?;
            if incidents.is_empty() {
                println!("No incidents recorded.");
            } else {
                println!("{:<25} | {:<8} | Verdict", "Created", "Severity");
                println!("{:-<25}-|-{:-<8}-|-{:-<40}", "", "", "");
                for incident in incidents {
                    println!(
                        "{:<25} | {:<8} | {}",
                        incident.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format!("{:?}", incident.severity),
                        incident.verdict
                    );
                }
            }
        }
    }

    Ok(())
}

/// One unscheduled measurement. Probe failures are reported and zeroed.
async fn probe_once(config: &MonitorConfig) -> Sample {
    let now = chrono::Utc::now();
    let latency = run_latency_bounded(
        &PingProbe::default(),
        &config.probe.target_host,
        config.probe.ping_count,
        false,
        config.probe_timeout(),
    )
    .await
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Latency probe failed");
        LatencyReport::default()
    });

    let throughput_mbps = run_throughput_bounded(
        &Iperf3Probe::new(config.probe.iperf_seconds),
        &config.probe.iperf_host,
        config.throughput_timeout(),
    )
    .await
    .map(|r| r.throughput_mbps)
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Throughput probe failed");
        0.0
    });

    Sample::new(
        now,
        latency.p95_latency_seconds,
        latency.jitter_ms,
        latency.loss_pct,
        throughput_mbps,
    )
}
