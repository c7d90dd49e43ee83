use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use scoring_monitor::config::{LoggingConfig, MonitorConfig};
use scoring_monitor::detect::engine::ScoringMonitor;
use scoring_monitor::detect::Severity;
use scoring_monitor::event::unix_now;
use scoring_monitor::storage::events::EventFilter;

#[derive(Parser)]
#[command(
    name = "scoring-monitor",
    about = "Real-time telemetry and anomaly detection for credit-scoring traffic",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Falls back to $SCORING_MONITOR_CONFIG, then /etc/scoring-monitor/monitor.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + maintenance scheduler)
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show engine stats (baseline and current window)
    Stats {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the weekly summary report
    Summary {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List persisted scoring events, newest first
    Events {
        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        api_key: Option<String>,

        /// Start of the time range (unix seconds)
        #[arg(long)]
        start: Option<f64>,

        /// End of the time range (unix seconds)
        #[arg(long)]
        end: Option<f64>,

        #[arg(long, default_value = "100", value_parser = clap::value_parser!(u16).range(1..=1000))]
        limit: u16,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// List persisted alerts, newest first
    Alerts {
        /// Look-back window in hours
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(u32).range(1..=168))]
        hours: u32,

        /// Only this severity (low, medium, high, critical)
        #[arg(long)]
        severity: Option<Severity>,
    },

    /// Delete events and alerts older than the retention period
    Cleanup {
        /// Days to keep (defaults to retention.days_to_keep)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Recompute the baseline from stored history and print it
    Baseline,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = MonitorConfig::resolve(cli.config.as_deref())?;

    // Initialize tracing
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting scoring monitor daemon");
            scoring_monitor::serve(config).await?;
        }
        Commands::Stats { json } => {
            let monitor = ScoringMonitor::open(config).await?;
            let stats = monitor.current_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let b = &stats.baseline_metrics;
                println!("\nScoring Monitor Stats");
                println!("{:<28} : {:?}", "System health", stats.system_health);
                println!("{:<28} : {}", "Events tracked", stats.total_events_tracked);
                println!("{:<28} : {}", "Events last hour", stats.events_last_hour);
                println!("{:<28} : {}", "Alerts last 24h", stats.alerts_last_24h);
                println!("{:<28} : {:.3}s (std {:.3})", "Baseline response time", b.avg_processing_time, b.std_processing_time);
                println!("{:<28} : {:.1} (std {:.1})", "Baseline credit score", b.avg_score, b.std_score);
                println!("{:<28} : {:.2}", "Baseline requests/hour", b.requests_per_hour);
                println!("{:<28} : {}", "Baseline samples", b.sample_count);
                println!();
            }
        }
        Commands::Summary { json } => {
            let monitor = ScoringMonitor::open(config).await?;
            let report = monitor.weekly_summary().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let v = &report.volume_metrics;
                let p = &report.performance_metrics;
                let s = &report.scoring_metrics;
                let a = &report.anomaly_summary;
                println!("\n=== Weekly Summary ({} .. {}) ===", report.period.start_date, report.period.end_date);
                println!("Requests:      {} ({:.1}/day, {} users, {} partners)", v.total_requests, v.daily_average, v.unique_users, v.unique_partners);
                println!("Response time: avg {:.3}s, p95 {:.3}s", p.avg_response_time, p.p95_response_time);
                println!("Error rate:    {:.2}% (uptime {:.2}%)", p.error_rate * 100.0, p.uptime_percentage);
                println!("Scores:        {} generated, avg {:.1}", s.total_scores_generated, s.avg_credit_score);
                println!("Alerts:        {} ({} critical, {} high)", a.total_alerts, a.critical_alerts, a.high_alerts);
                println!("\nRecommendations:");
                for rec in &report.recommendations {
                    println!(" - {}", rec);
                }
                println!();
            }
        }
        Commands::Events {
            user_id,
            api_key,
            start,
            end,
            limit,
            offset,
        } => {
            let monitor = ScoringMonitor::open(config).await?;
            let filter = EventFilter {
                user_id,
                api_key,
                start,
                end,
            };
            let events = monitor.query_events(filter, usize::from(limit), offset).await?;
            if events.is_empty() {
                println!("No events found.");
            } else {
                println!("{:<18} | {:<16} | {:<16} | {:<6} | {:<9} | Score", "Timestamp", "User", "API key", "Status", "Latency");
                println!("{:-<18}-|-{:-<16}-|-{:-<16}-|-{:-<6}-|-{:-<9}-|-{:-<6}", "", "", "", "", "", "");
                for e in events {
                    let score = e.credit_score().map(|s| format!("{s:.0}")).unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<18.3} | {:<16} | {:<16} | {:<6} | {:<9.3} | {}",
                        e.timestamp, e.user_id, e.api_key, e.status_code, e.processing_time, score
                    );
                }
            }
        }
        Commands::Alerts { hours, severity } => {
            let monitor = ScoringMonitor::open(config).await?;
            let since = unix_now() - f64::from(hours) * 3600.0;
            let alerts = monitor.query_alerts(since, None, severity, 1000).await?;
            if alerts.is_empty() {
                println!("No alerts in the last {} hours.", hours);
            } else {
                for a in alerts {
                    println!("[{:<8}] {:.0} {:<24} {}", a.severity.as_str().to_uppercase(), a.timestamp, a.alert_type, a.description);
                }
            }
        }
        Commands::Cleanup { days } => {
            let days = days.unwrap_or(config.retention.days_to_keep);
            let monitor = ScoringMonitor::open(config).await?;
            let report = monitor.cleanup(days).await?;
            println!(
                "Deleted {} events and {} alerts older than {} days.",
                report.events_deleted, report.alerts_deleted, days
            );
        }
        Commands::Baseline => {
            let monitor = ScoringMonitor::open(config).await?;
            let baseline = monitor.recompute_baseline().await?;
            println!("{}", serde_json::to_string_pretty(&baseline)?);
        }
    }

    Ok(())
}
