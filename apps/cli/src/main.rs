#![deny(warnings)]

//! Headless CLI comparing the fair and the house-biased Color Game.

use anyhow::{bail, Context, Result};
use game_core::{GameConfig, SimConfig};
use game_odds::{theoretical_house_edge, theoretical_house_edge_random};
use rust_decimal::Decimal;
use serde::Serialize;
use sim_runtime::{compare_models, Simulator, Strategy, TrialParams};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    trials: Option<usize>,
    rounds: Option<usize>,
    stake: Option<Decimal>,
    seed: Option<u64>,
    strategy: Option<String>,
    parallel: bool,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} expects a value"));
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--trials" => args.trials = Some(value()?.parse().context("--trials")?),
            "--rounds" => args.rounds = Some(value()?.parse().context("--rounds")?),
            "--stake" => args.stake = Some(value()?.parse().context("--stake")?),
            "--seed" => args.seed = Some(value()?.parse().context("--seed")?),
            "--strategy" => args.strategy = Some(value()?),
            "--parallel" => args.parallel = true,
            "--json" => args.json = true,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(n) = args.trials {
        cfg.num_trials = n;
    }
    if let Some(n) = args.rounds {
        cfg.max_rounds = n;
    }
    if let Some(stake) = args.stake {
        cfg.stake = stake;
    }
    if let Some(seed) = args.seed {
        cfg.rng_seed = seed;
    }
    if let Some(strategy) = &args.strategy {
        cfg.strategy = strategy.clone();
    }
    cfg.parallel |= args.parallel;
    cfg.validate()?;
    Ok(cfg)
}

/// Closed-form edges shown next to the simulated ones.
#[derive(Debug, Serialize)]
struct TheoreticalEdges {
    fair: f64,
    biased_random_bettor: f64,
    biased_on_house_color: f64,
}

fn theoretical(cfg: &SimConfig, fair: &GameConfig, biased: &GameConfig) -> Result<TheoreticalEdges> {
    Ok(TheoreticalEdges {
        fair: theoretical_house_edge_random(fair)?,
        biased_random_bettor: theoretical_house_edge_random(biased)?,
        biased_on_house_color: theoretical_house_edge(biased, cfg.house_color)?,
    })
}

/// Bankroll extremes seen across round-by-round sessions.
#[derive(Debug, Serialize)]
struct Trajectory {
    games: usize,
    samples: usize,
    lowest_bankroll: Decimal,
    highest_bankroll: Decimal,
}

fn trajectory(config: &GameConfig, seed: u64, params: &TrialParams) -> Result<Trajectory> {
    let mut sim = Simulator::new(config.clone(), seed)?;
    let mut lowest = config.initial_bankroll;
    let mut highest = config.initial_bankroll;
    let samples = sim.stream_detailed(params, |s| {
        lowest = lowest.min(s.record.bankroll_after);
        highest = highest.max(s.record.bankroll_after);
    })?;
    Ok(Trajectory {
        games: params.num_trials,
        samples,
        lowest_bankroll: lowest,
        highest_bankroll: highest,
    })
}

#[derive(Debug, Serialize)]
struct RunOutput {
    config: SimConfig,
    theoretical: TheoreticalEdges,
    analysis: data_pipeline::ComparisonReport,
    fair_trajectory: Trajectory,
    biased_trajectory: Trajectory,
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    info!(version = env!("CARGO_PKG_VERSION"), ?args, "starting CLI");

    let cfg = load_config(&args)?;
    let strategy: Strategy = cfg.strategy.parse()?;
    let fair = cfg.fair_game()?;
    let biased = cfg.biased_game()?;
    let theory = theoretical(&cfg, &fair, &biased)?;

    let params = TrialParams {
        num_trials: cfg.num_trials,
        max_rounds: cfg.max_rounds,
        stake: cfg.stake,
        strategy,
    };
    info!(
        trials = params.num_trials,
        rounds = params.max_rounds,
        stake = %params.stake,
        %strategy,
        seed = cfg.rng_seed,
        "running simulations"
    );
    let runs = compare_models(&fair, &biased, &params, cfg.rng_seed, cfg.parallel)?;
    let analysis = data_pipeline::compare(&runs.fair, &runs.biased)?;

    let detail = TrialParams {
        num_trials: cfg.detailed_games,
        ..params.clone()
    };
    let fair_trajectory = trajectory(&fair, cfg.rng_seed, &detail)?;
    let biased_trajectory = trajectory(&biased, cfg.rng_seed.wrapping_add(1), &detail)?;

    if args.json {
        let out = RunOutput {
            config: cfg,
            theoretical: theory,
            analysis,
            fair_trajectory,
            biased_trajectory,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Config | trials: {} | rounds: {} | stake: ${} | strategy: {} | house color: {} @ {:.2}% | payout x{}",
        cfg.num_trials,
        cfg.max_rounds,
        cfg.stake,
        strategy,
        cfg.house_color,
        cfg.house_color_weight * 100.0,
        cfg.payout_modifier
    );
    println!(
        "Theory | fair edge: {:.4}% | biased edge (random bettor): {:.4}% | biased edge (house color): {:.4}%",
        theory.fair * 100.0,
        theory.biased_random_bettor * 100.0,
        theory.biased_on_house_color * 100.0
    );
    for (label, report) in [("fair", &analysis.fair), ("biased", &analysis.biased)] {
        println!(
            "KPI {} | mean profit: ${:.2} | median: ${:.2} | std: ${:.2} | win rate: {:.2}% | bankrupt: {:.2}% | edge: {:.4}% | mean ROI: {:.2}%",
            label,
            report.summary.mean_profit,
            report.summary.median_profit,
            report.summary.std_profit,
            report.summary.win_rate * 100.0,
            report.summary.bankruptcy_rate * 100.0,
            report.house_edge * 100.0,
            report.roi.mean_roi
        );
    }
    println!(
        "Tests | edge diff: {:.4}% | t: {:.4} (p={:.6}) | U: {:.1} (p={:.6})",
        analysis.house_edge.difference * 100.0,
        analysis.hypothesis.t_test.statistic,
        analysis.hypothesis.t_test.p_value,
        analysis.hypothesis.mann_whitney.statistic,
        analysis.hypothesis.mann_whitney.p_value
    );
    for (label, t) in [("fair", &fair_trajectory), ("biased", &biased_trajectory)] {
        println!(
            "Trajectory {} | games: {} | rounds: {} | low: ${} | high: ${}",
            label, t.games, t.samples, t.lowest_bankroll, t.highest_bankroll
        );
    }

    Ok(())
}
