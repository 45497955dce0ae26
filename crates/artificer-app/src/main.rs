use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use artificer_control::RegimeTransition;
use artificer_core::{ArtificerConfig, Regime};
use artificer_engine::{DecisionSource, LiveEngine, TickEvent};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "artificer",
    version,
    about = "Run the Artificer decision loop headless over the built-in sandbox"
)]
struct Cli {
    /// JSON configuration file; unspecified fields keep their defaults.
    #[arg(short, long, env = "ARTIFICER_CONFIG")]
    config: Option<PathBuf>,
    /// Override the configured RNG seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of ticks to run.
    #[arg(long, default_value_t = 1_000)]
    ticks: u64,
    /// Random agent selection and wall-clock training cost.
    #[arg(long)]
    wall_clock: bool,
    /// Freeze model weights (ablation).
    #[arg(long)]
    frozen: bool,
    /// Disable replay retraining.
    #[arg(long)]
    no_training: bool,
    /// Log a progress line every N ticks (0 disables).
    #[arg(long, default_value_t = 100)]
    report_every: u64,
    /// Write every tick report as JSON lines.
    #[arg(long)]
    reports_out: Option<PathBuf>,
    /// Write the final engine snapshot as JSON.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    ticks: u64,
    sim_time: f32,
    final_regime: Regime,
    regime_reason: String,
    transitions: Vec<RegimeTransition>,
    interactions: u64,
    novel_total: u64,
    resource_total: f32,
    stalls: u64,
    anchors: u64,
    controller_converged: u64,
    controller_blocked: u64,
    forced_explore: u64,
    training_steps: u64,
    mean_prediction_error: f32,
    embedding_clusters: usize,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let summary = run(&cli, config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ArtificerConfig> {
    let mut config = match &cli.config {
        Some(path) => ArtificerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ArtificerConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = seed;
    }
    if cli.wall_clock {
        config.deterministic = false;
    }
    if cli.no_training {
        config.training.enabled = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(cli: &Cli, config: ArtificerConfig) -> Result<RunSummary> {
    if cli.ticks == 0 {
        bail!("--ticks must be at least 1");
    }
    let mut engine = LiveEngine::sandbox(config).context("failed to build engine")?;
    if cli.frozen {
        engine.model_mut().set_frozen(true);
    }
    let mut reports = match &cli.reports_out {
        Some(path) => Some(BufWriter::new(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => None,
    };

    info!(
        seed = engine.config().rng_seed,
        ticks = cli.ticks,
        deterministic = engine.config().deterministic,
        frozen = cli.frozen,
        "starting run"
    );

    let mut summary = RunSummary::default();
    for _ in 0..cli.ticks {
        let report = engine.tick();
        if report.prediction_error.is_some() {
            summary.interactions += 1;
        }
        if report.source == DecisionSource::ForcedExplore {
            summary.forced_explore += 1;
        }
        for event in &report.events {
            match event {
                TickEvent::AnchorEstablished { .. } => summary.anchors += 1,
                TickEvent::ControllerConverged { .. } => summary.controller_converged += 1,
                TickEvent::ControllerBlocked { .. } => summary.controller_blocked += 1,
                TickEvent::TrainingError { message } => warn!(%message, "training error"),
                _ => {}
            }
        }
        if let Some(writer) = reports.as_mut() {
            serde_json::to_writer(&mut *writer, &report)?;
            writer.write_all(b"\n")?;
        }
        if cli.report_every > 0 && report.tick.0.is_multiple_of(cli.report_every) {
            info!(
                tick = report.tick.0,
                regime = report.regime.as_str(),
                resource_per_minute = report.metrics.resource_per_minute,
                mean_error = report.metrics.mean_prediction_error,
                novel_per_minute = report.metrics.novel_per_minute,
                replay = report.metrics.replay_size,
                training = report.training.state.as_str(),
                "progress"
            );
        }
    }
    if let Some(mut writer) = reports {
        writer.flush()?;
    }

    if let Some(path) = &cli.snapshot_out {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &engine.snapshot())
            .context("failed to write snapshot")?;
        writer.flush()?;
        info!(path = %path.display(), "snapshot written");
    }

    let aggregate = engine.aggregate();
    summary.ticks = engine.tick_count().0;
    summary.sim_time = engine.sim_time();
    summary.final_regime = engine.regime();
    summary.regime_reason = engine.regime_machine().reason().to_owned();
    summary.transitions = engine.regime_machine().transitions().to_vec();
    summary.novel_total = engine.rolling().novel_total();
    summary.resource_total = engine.rolling().resource_total();
    summary.stalls = aggregate.stalls_total;
    summary.training_steps = engine
        .scheduler()
        .metrics(f64::from(engine.sim_time()), engine.replay().len())
        .steps_total;
    summary.mean_prediction_error = aggregate.mean_prediction_error;
    summary.embedding_clusters = aggregate.embedding_clusters;

    info!(
        ticks = summary.ticks,
        regime = summary.final_regime.as_str(),
        interactions = summary.interactions,
        anchors = summary.anchors,
        "run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(ticks: &str) -> Cli {
        Cli::parse_from(["artificer", "--ticks", ticks, "--report-every", "0"])
    }

    #[test]
    fn summary_carries_regime_history() {
        let mut config = ArtificerConfig::default();
        config.regime.min_explore_secs = 2.0;
        config.regime.exploit_error_threshold = 10.0;
        config.regime.manufacture_min_dwell_secs = 3.0;
        config.regime.stability_window_secs = 1.0;
        config.regime.max_novel_per_minute = 1.0e6;
        config.regime.max_prediction_error = 1.0e6;
        config.regime.max_resource_variance = 1.0e9;

        let summary = run(&cli("600"), config).expect("run");
        assert_eq!(summary.final_regime, Regime::Manufacture);
        assert_eq!(summary.transitions.len(), 2);
        let last = summary.transitions.last().expect("transition");
        assert_eq!(last.to, Regime::Manufacture);
        assert_eq!(summary.regime_reason, last.reason);

        let json = serde_json::to_value(&summary).expect("summary json");
        assert_eq!(json["transitions"][0]["to"], "exploit");
    }

    #[test]
    fn short_run_keeps_initial_reason() {
        let summary = run(&cli("20"), ArtificerConfig::default()).expect("run");
        assert_eq!(summary.final_regime, Regime::Explore);
        assert_eq!(summary.regime_reason, "initial");
        assert!(summary.transitions.is_empty());
    }
}
