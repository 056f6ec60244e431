//! CLI tool for Fleetwatch

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use colored::Colorize;
#[cfg(feature = "cli")]
use fleetwatch::{
    AlertSeverity, DeviceState, FleetConfig, FleetEngine, FleetReport, ThrottleDecision,
};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "fleetwatch")]
#[command(about = "Fleetwatch: fleet analysis and thermal policy engine for racked devices", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Print a sample configuration file
    SampleConfig,
    /// Provision from config, ingest a telemetry snapshot and print the fleet report
    Report {
        /// Fleet configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Telemetry snapshot: JSON array of device states
        #[arg(short, long)]
        telemetry: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::init();

    match cli.command {
        Commands::SampleConfig => {
            print!("{}", FleetConfig::sample_toml());
        }
        Commands::Report {
            config,
            telemetry,
            format,
        } => {
            let config = FleetConfig::from_toml_file(&config)?;
            let engine = FleetEngine::from_config(&config)?;

            let raw = std::fs::read_to_string(&telemetry)?;
            let devices: Vec<DeviceState> = serde_json::from_str(&raw)?;
            log::info!("ingesting {} device records from {}", devices.len(), telemetry.display());

            let mut decisions = Vec::new();
            let mut failures = Vec::new();
            for device in devices {
                let id = device.id.to_string();
                match engine.ingest(device) {
                    Ok(outcome) => decisions.push((id, outcome.decision)),
                    Err(e) => {
                        log::warn!("device {}: {}", id, e);
                        failures.push(format!("{}: {}", id, e));
                    }
                }
            }

            let report = engine.report()?;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "report": report,
                            "decisions": decisions,
                            "ingest_failures": failures,
                        }))?
                    );
                }
                OutputFormat::Text => print_report(&report, &decisions, &failures),
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn print_report(report: &FleetReport, decisions: &[(String, ThrottleDecision)], failures: &[String]) {
    let s = &report.summary;
    println!("{}", format!("═══ Fleet {} ═══", report.fleet_name).cyan().bold());
    println!(
        "  {} {} ({} healthy, {} skipped)",
        "Devices:".white().bold(),
        s.total_devices.to_string().green(),
        s.healthy_devices,
        s.skipped_devices
    );
    for (resource, usage) in &s.resource_usage {
        println!("  {} {:.1}", format!("avg {}:", resource).white(), usage);
    }

    println!("\n{}", "═══ Alerts ═══".cyan().bold());
    if report.alerts.is_empty() {
        println!("  {}", "none".green());
    }
    for alert in &report.alerts {
        let tag = match alert.severity {
            AlertSeverity::Critical => "CRIT".red().bold(),
            AlertSeverity::Warning => "WARN".yellow(),
            AlertSeverity::Info => "INFO".blue(),
        };
        println!("  [{}] {} {}", tag, alert.device_id.to_string().white().bold(), alert.message);
    }

    println!("\n{}", "═══ Recommendations ═══".cyan().bold());
    for rec in &report.recommendations {
        let ids: Vec<String> = rec.device_ids.iter().map(|d| d.to_string()).collect();
        println!(
            "  {} {} (priority {}): {}",
            "▶".green(),
            rec.action.to_string().white().bold(),
            rec.priority,
            rec.reason
        );
        println!("    {} {}", "devices:".dimmed(), ids.join(", "));
    }

    println!("\n{}", "═══ Thermal Zones ═══".cyan().bold());
    for zone in &report.zones {
        let m = &zone.metrics;
        println!(
            "  {} {}: {} devices, max {:.1}°C, avg {:.1}°C, {} over temp, {} throttled",
            "▶".green(),
            zone.zone.white().bold(),
            m.total_devices,
            m.max_temp,
            m.average_temp,
            m.devices_over_temp,
            m.devices_throttled
        );
        for violation in &m.policy_violations {
            println!("    {} {}", "violation:".red(), violation);
        }
    }

    println!("\n{}", "═══ Throttle Decisions ═══".cyan().bold());
    for (id, decision) in decisions {
        let label = match decision {
            ThrottleDecision::Normal => "normal".green(),
            ThrottleDecision::Warning => "warning".yellow(),
            ThrottleDecision::Throttled => "throttled".red().bold(),
            ThrottleDecision::Held => "held".red(),
            ThrottleDecision::Released => "released".green(),
            ThrottleDecision::Rejected { .. } => "rejected".magenta().bold(),
            ThrottleDecision::Unmanaged => "unmanaged".yellow().bold(),
        };
        println!("  {} {}", id.white(), label);
    }

    println!("\n{}", "═══ Thermal Events ═══".cyan().bold());
    for event in &report.events {
        println!(
            "  {} {} {} throttled={}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.to_string().yellow(),
            event.device_id,
            event.throttled
        );
    }

    if !failures.is_empty() {
        println!("\n{}", "═══ Ingest Failures ═══".red().bold());
        for f in failures {
            println!("  {}", f);
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("fleetwatch CLI requires the 'cli' feature");
}
