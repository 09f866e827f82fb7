#![deny(warnings)]

//! Session runtime and Monte Carlo drivers for the Color Game.
//!
//! A [`GameSession`] is the stateful player account. The free functions
//! drive sessions with an injected RNG; [`Simulator`] bundles a session with
//! its own seeded ChaCha stream, and [`run_trials_parallel`] fans trials out
//! over worker threads with one stream per trial.

use game_core::{
    Color, GameConfig, GameError, ProbabilityProfile, RoundRecord, RoundSample, SessionSummary,
};
use game_odds::{resolve, DiceSampler};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Player account for one game configuration.
#[derive(Clone, Debug)]
pub struct GameSession {
    config: GameConfig,
    sampler: DiceSampler,
    bankroll: Decimal,
    house_profit: Decimal,
    history: Vec<RoundRecord>,
}

impl GameSession {
    /// Validate `config` and open a session at the initial bankroll.
    pub fn new(config: GameConfig) -> Result<Self, GameError> {
        config.validate()?;
        let sampler = DiceSampler::new(&config.profile)?;
        let bankroll = config.initial_bankroll;
        Ok(Self {
            config,
            sampler,
            bankroll,
            house_profit: Decimal::ZERO,
            history: Vec::new(),
        })
    }

    /// Roll the dice for one bet and settle it.
    ///
    /// Fails without touching the session when the stake is negative,
    /// exceeds the bankroll, or the settled amounts would overflow.
    pub fn play_round<R: Rng>(
        &mut self,
        bet: Color,
        stake: Decimal,
        rng: &mut R,
    ) -> Result<RoundRecord, GameError> {
        if stake < Decimal::ZERO {
            return Err(GameError::InvalidStake(stake));
        }
        if stake > self.bankroll {
            return Err(GameError::InsufficientFunds {
                stake,
                bankroll: self.bankroll,
            });
        }
        let outcome = self.sampler.draw(self.config.num_dice, rng);
        let (net_winnings, match_count) =
            resolve(bet, &outcome, stake, self.config.payout_modifier)?;
        let bankroll = self
            .bankroll
            .checked_add(net_winnings)
            .ok_or(GameError::Overflow)?;
        let house_profit = self
            .house_profit
            .checked_sub(net_winnings)
            .ok_or(GameError::Overflow)?;
        self.bankroll = bankroll;
        self.house_profit = house_profit;
        let record = RoundRecord {
            bet_color: bet,
            stake,
            outcome,
            match_count,
            net_winnings,
            bankroll_after: self.bankroll,
            house_profit_after: self.house_profit,
        };
        self.history.push(record.clone());
        Ok(record)
    }

    /// Return to the starting bankroll with an empty history.
    pub fn reset(&mut self) {
        self.bankroll = self.config.initial_bankroll;
        self.house_profit = Decimal::ZERO;
        self.history.clear();
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn initial_bankroll(&self) -> Decimal {
        self.config.initial_bankroll
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    /// Cumulative house profit; always the negation of the player's net result.
    pub fn house_profit(&self) -> Decimal {
        self.house_profit
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Summary of the rounds played since the last reset.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_history(
            self.config.initial_bankroll,
            self.bankroll,
            self.house_profit,
            &self.history,
        )
    }
}

/// Color selection policy, applied once per round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniform pick over all colors, ignoring the dice weights.
    Random,
    /// Always the same color.
    Fixed(Color),
    /// Always the favored color; random when the profile has none.
    FollowBias,
}

impl Strategy {
    /// Choose the color to bet this round.
    pub fn pick<R: Rng>(&self, profile: &ProbabilityProfile, rng: &mut R) -> Color {
        match self {
            Strategy::Random => random_color(rng),
            Strategy::Fixed(color) => *color,
            Strategy::FollowBias => match profile.distinguished() {
                Some(color) => color,
                None => random_color(rng),
            },
        }
    }
}

fn random_color<R: Rng>(rng: &mut R) -> Color {
    Color::ALL[rng.gen_range(0..Color::ALL.len())]
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Random => f.write_str("random"),
            Strategy::Fixed(color) => write!(f, "fixed:{}", color.name().to_lowercase()),
            Strategy::FollowBias => f.write_str("follow_bias"),
        }
    }
}

impl FromStr for Strategy {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        match label.as_str() {
            "random" => Ok(Strategy::Random),
            "single_color" => Ok(Strategy::Fixed(Color::Red)),
            "follow_bias" | "house_color" => Ok(Strategy::FollowBias),
            other => match other.strip_prefix("fixed:") {
                Some(color) => Ok(Strategy::Fixed(color.parse()?)),
                None => Err(GameError::InvalidConfig(format!("unknown strategy {s:?}"))),
            },
        }
    }
}

/// Shape of a batch of sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialParams {
    /// Sessions to play.
    pub num_trials: usize,
    /// Round ceiling per session.
    pub max_rounds: usize,
    /// Stake placed every round.
    pub stake: Decimal,
    pub strategy: Strategy,
}

impl Default for TrialParams {
    fn default() -> Self {
        Self {
            num_trials: 10_000,
            max_rounds: 100,
            stake: Decimal::new(10, 0),
            strategy: Strategy::Random,
        }
    }
}

fn check_stake(stake: Decimal) -> Result<(), GameError> {
    if stake < Decimal::ZERO {
        return Err(GameError::InvalidStake(stake));
    }
    Ok(())
}

/// Reset `session` and play up to `max_rounds`, stopping early once the
/// bankroll can no longer cover `stake`.
pub fn run_session<R: Rng>(
    session: &mut GameSession,
    rng: &mut R,
    max_rounds: usize,
    stake: Decimal,
    strategy: Strategy,
) -> Result<SessionSummary, GameError> {
    check_stake(stake)?;
    session.reset();
    for _ in 0..max_rounds {
        let bet = strategy.pick(&session.config.profile, rng);
        if session.bankroll < stake {
            break;
        }
        session.play_round(bet, stake, rng)?;
    }
    Ok(session.summary())
}

/// Play `params.num_trials` independent sessions in order.
pub fn run_trials<R: Rng>(
    session: &mut GameSession,
    rng: &mut R,
    params: &TrialParams,
) -> Result<Vec<SessionSummary>, GameError> {
    run_trials_until(session, rng, params, None)
}

fn run_trials_until<R: Rng>(
    session: &mut GameSession,
    rng: &mut R,
    params: &TrialParams,
    abort: Option<&AtomicBool>,
) -> Result<Vec<SessionSummary>, GameError> {
    check_stake(params.stake)?;
    let mut summaries = Vec::with_capacity(params.num_trials);
    for trial in 0..params.num_trials {
        if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            warn!(
                completed = trial,
                requested = params.num_trials,
                "trial batch aborted"
            );
            break;
        }
        summaries.push(run_session(
            session,
            rng,
            params.max_rounds,
            params.stake,
            params.strategy,
        )?);
    }
    info!(
        trials = summaries.len(),
        max_rounds = params.max_rounds,
        strategy = %params.strategy,
        "trial batch complete"
    );
    Ok(summaries)
}

/// Play `params.num_trials` sessions, handing every round to `sink` as soon
/// as it is resolved. Returns the number of samples emitted.
pub fn stream_detailed<R: Rng, F: FnMut(RoundSample)>(
    session: &mut GameSession,
    rng: &mut R,
    params: &TrialParams,
    mut sink: F,
) -> Result<usize, GameError> {
    check_stake(params.stake)?;
    let mut emitted = 0usize;
    for game_index in 0..params.num_trials {
        session.reset();
        for round_index in 0..params.max_rounds {
            let bet = params.strategy.pick(&session.config.profile, rng);
            if session.bankroll < params.stake {
                break;
            }
            let record = session.play_round(bet, params.stake, rng)?;
            sink(RoundSample {
                game_index,
                round_index,
                record,
            });
            emitted += 1;
        }
        debug!(game_index, rounds = session.history.len(), "detailed game done");
    }
    Ok(emitted)
}

/// Collecting form of [`stream_detailed`].
pub fn run_detailed<R: Rng>(
    session: &mut GameSession,
    rng: &mut R,
    params: &TrialParams,
) -> Result<Vec<RoundSample>, GameError> {
    let mut samples = Vec::new();
    stream_detailed(session, rng, params, |s| samples.push(s))?;
    Ok(samples)
}

/// RNG stream dedicated to trial `trial` of a batch seeded with `seed`.
pub fn trial_rng(seed: u64, trial: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(trial as u64))
}

/// Play `params.num_trials` sessions across worker threads.
///
/// Each worker owns a clone of the session and each trial draws from its own
/// [`trial_rng`], so results are identical for any thread count and land at
/// their trial index.
pub fn run_trials_parallel(
    config: &GameConfig,
    seed: u64,
    params: &TrialParams,
) -> Result<Vec<SessionSummary>, GameError> {
    check_stake(params.stake)?;
    let template = GameSession::new(config.clone())?;
    let summaries = (0..params.num_trials)
        .into_par_iter()
        .map_init(
            || template.clone(),
            |session, trial| {
                let mut rng = trial_rng(seed, trial);
                run_session(
                    session,
                    &mut rng,
                    params.max_rounds,
                    params.stake,
                    params.strategy,
                )
            },
        )
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        trials = summaries.len(),
        max_rounds = params.max_rounds,
        strategy = %params.strategy,
        "parallel trial batch complete"
    );
    Ok(summaries)
}

/// A session paired with its own seeded RNG stream.
pub struct Simulator {
    session: GameSession,
    rng: ChaCha8Rng,
    abort: Option<Arc<AtomicBool>>,
}

impl Simulator {
    pub fn new(config: GameConfig, seed: u64) -> Result<Self, GameError> {
        Ok(Self {
            session: GameSession::new(config)?,
            rng: ChaCha8Rng::seed_from_u64(seed),
            abort: None,
        })
    }

    /// Stop trial batches at the next trial boundary once `flag` is set.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn run_session(
        &mut self,
        max_rounds: usize,
        stake: Decimal,
        strategy: Strategy,
    ) -> Result<SessionSummary, GameError> {
        run_session(&mut self.session, &mut self.rng, max_rounds, stake, strategy)
    }

    /// Sequential trial batch; returns the completed prefix if aborted.
    pub fn run_trials(&mut self, params: &TrialParams) -> Result<Vec<SessionSummary>, GameError> {
        run_trials_until(
            &mut self.session,
            &mut self.rng,
            params,
            self.abort.as_deref(),
        )
    }

    pub fn run_detailed(&mut self, params: &TrialParams) -> Result<Vec<RoundSample>, GameError> {
        run_detailed(&mut self.session, &mut self.rng, params)
    }

    pub fn stream_detailed<F: FnMut(RoundSample)>(
        &mut self,
        params: &TrialParams,
        sink: F,
    ) -> Result<usize, GameError> {
        stream_detailed(&mut self.session, &mut self.rng, params, sink)
    }
}

/// Trial results of a fair and a biased model under identical parameters.
#[derive(Clone, Debug, Serialize)]
pub struct ModelComparison {
    pub fair: Vec<SessionSummary>,
    pub biased: Vec<SessionSummary>,
}

fn run_batch(
    config: &GameConfig,
    seed: u64,
    params: &TrialParams,
    parallel: bool,
) -> Result<Vec<SessionSummary>, GameError> {
    if parallel {
        run_trials_parallel(config, seed, params)
    } else {
        Simulator::new(config.clone(), seed)?.run_trials(params)
    }
}

/// Run the same trial batch against both models.
///
/// The biased model is seeded past every stream the fair model uses.
pub fn compare_models(
    fair: &GameConfig,
    biased: &GameConfig,
    params: &TrialParams,
    seed: u64,
    parallel: bool,
) -> Result<ModelComparison, GameError> {
    info!(trials = params.num_trials, parallel, "running fair model");
    let fair_results = run_batch(fair, seed, params, parallel)?;
    let biased_seed = seed
        .wrapping_add(params.num_trials as u64)
        .wrapping_add(1);
    info!(trials = params.num_trials, parallel, "running biased model");
    let biased_results = run_batch(biased, biased_seed, params, parallel)?;
    Ok(ModelComparison {
        fair: fair_results,
        biased: biased_results,
    })
}
