//! nav_sim CLI
//!
//! Drives a simulated vehicle along a routed path, detects course deviations
//! and recalculates, printing every navigation event.

mod router;
mod sim;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nav_core::{NavEvent, Navigator, Point, TrackingConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::router::{GridRouter, LocalFrame, OsrmRouter, Router};
use crate::sim::{RunOptions, RunSummary};

#[derive(Parser)]
#[command(name = "nav_sim")]
#[command(about = "Simulate route following with deviation detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a route and drive it
    Run {
        /// Start point "x,y" (meters)
        #[arg(long, value_parser = parse_point)]
        start: Point,

        /// Destination "x,y" (meters)
        #[arg(long, value_parser = parse_point)]
        end: Point,

        /// Routing backend
        #[arg(long, value_enum, default_value = "grid")]
        router: RouterKind,

        /// Street spacing for the grid router (meters)
        #[arg(long, default_value = "100")]
        block: f64,

        /// OSRM base URL
        #[arg(long, default_value = "http://router.project-osrm.org")]
        osrm_url: String,

        /// Geographic origin "lat,lon" that planar (0,0) maps to (OSRM only)
        #[arg(long, value_parser = parse_point, default_value = "52.52,13.405")]
        origin: Point,

        /// HTTP timeout per OSRM request (seconds)
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Retries for transient OSRM failures
        #[arg(long, default_value = "3")]
        retries: u32,

        #[command(flatten)]
        config: ConfigArgs,

        /// Tick rate (Hz)
        #[arg(long, default_value = "10")]
        tick_hz: f64,

        /// Simulated time budget (seconds)
        #[arg(long, default_value = "600")]
        duration: f64,

        /// Pace ticks in wall-clock time
        #[arg(long, default_value = "false")]
        realtime: bool,

        /// Print events and summary as JSON lines
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print the effective tracking configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Preset: default, urban, highway (falls back to NAV_TRACKING_PROFILE)
    #[arg(long)]
    profile: Option<String>,

    /// JSON configuration file; overrides the preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable the simulated wrong-turn generator
    #[arg(long, default_value = "false")]
    detour: bool,

    /// Seed for the wrong-turn generator
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RouterKind {
    Grid,
    Osrm,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nav_core=info,nav_sim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            start,
            end,
            router,
            block,
            osrm_url,
            origin,
            timeout,
            retries,
            config,
            tick_hz,
            duration,
            realtime,
            json,
        } => {
            let config = config.resolve()?;
            let router = match router {
                RouterKind::Grid => Router::Grid(GridRouter::new(block)),
                RouterKind::Osrm => Router::Osrm(OsrmRouter::new(
                    osrm_url,
                    LocalFrame::new(origin.0, origin.1),
                    timeout,
                    retries,
                )?),
            };
            let nav = Navigator::new(config)?;
            let opts = RunOptions {
                start,
                end,
                tick_hz,
                duration,
                realtime,
            };
            info!(?start, ?end, "starting simulation");

            let summary = sim::run(nav, Arc::new(router), opts, |event| {
                print_event(event, json)
            })
            .await?;
            print_summary(&summary, json)?;
        }

        Commands::Config { config } => {
            let config = config.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

impl ConfigArgs {
    fn resolve(&self) -> Result<TrackingConfig> {
        let mut config = match (&self.config, &self.profile) {
            (Some(path), _) => load_config(path)?,
            (None, Some(profile)) => TrackingConfig::from_profile_name(profile),
            (None, None) => TrackingConfig::from_env_or_default(),
        };
        if self.detour {
            config.detour.enabled = true;
        }
        if let Some(seed) = self.seed {
            config.detour.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<TrackingConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    TrackingConfig::from_json(&json)
        .with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {:?}", s))?;
    let a: f64 = a.trim().parse().map_err(|e| format!("{}: {}", a, e))?;
    let b: f64 = b.trim().parse().map_err(|e| format!("{}: {}", b, e))?;
    if !(a.is_finite() && b.is_finite()) {
        return Err(format!("non-finite coordinate in {:?}", s));
    }
    Ok((a, b))
}

fn print_event(event: &NavEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(%e, "failed to encode event"),
        }
    } else {
        println!("{:?}", event);
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
        return Ok(());
    }
    println!();
    println!("Simulation summary:");
    println!("   Ticks:          {}", summary.ticks);
    println!("   Elapsed:        {:.1}s", summary.elapsed);
    println!("   Completed:      {}", summary.completed);
    println!("   Deviations:     {}", summary.deviations);
    println!(
        "   Recalculations: {} ({} failed)",
        summary.recalculations, summary.failed_recalculations
    );
    println!("   Average speed:  {:.2} m/s", summary.average_speed);
    if let Some((x, y)) = summary.final_position {
        println!("   Final position: ({:.1}, {:.1})", x, y);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(config: Option<PathBuf>, profile: Option<&str>) -> ConfigArgs {
        ConfigArgs {
            profile: profile.map(str::to_string),
            config,
            detour: false,
            seed: None,
        }
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("1.5, -2"), Ok((1.5, -2.0)));
        assert!(parse_point("1.5").is_err());
        assert!(parse_point("a,b").is_err());
        assert!(parse_point("inf,0").is_err());
    }

    #[test]
    fn test_profile_and_detour_flags() {
        let mut a = args(None, Some("highway"));
        a.detour = true;
        a.seed = Some(9);
        let config = a.resolve().unwrap();
        assert_eq!(config.deviation, TrackingConfig::highway().deviation);
        assert!(config.detour.enabled);
        assert_eq!(config.detour.seed, 9);
    }

    #[test]
    fn test_config_file_overrides_profile() {
        let mut expected = TrackingConfig::urban();
        expected.deviation.iteration_threshold = 4;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&expected).unwrap()).unwrap();

        let config = args(Some(file.path().to_path_buf()), Some("highway"))
            .resolve()
            .unwrap();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_bad_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"segment\": 3}}").unwrap();
        assert!(args(Some(file.path().to_path_buf()), None).resolve().is_err());

        let missing = PathBuf::from("/nonexistent/nav_config.json");
        assert!(args(Some(missing), None).resolve().is_err());
    }
}
