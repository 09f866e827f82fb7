#![deny(warnings)]

//! Core domain models and invariants for the Color Game simulator.
//!
//! This crate defines the serializable types shared by the odds model, the
//! session runtime and the analysis pipeline, with validation helpers that
//! guarantee basic invariants before any dice are rolled.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bettable colors on each die.
pub const NUM_COLORS: usize = 6;
/// Dice rolled per round unless configured otherwise.
pub const DEFAULT_NUM_DICE: usize = 3;
/// Allowed drift of a profile's weight sum away from 1.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;
/// Default draw weight of the house color in a biased game.
pub const DEFAULT_HOUSE_COLOR_WEIGHT: f64 = 0.20;

/// Default payout modifier of the biased game (0.95).
pub fn default_payout_modifier() -> Decimal {
    Decimal::new(95, 2)
}

/// Default starting bankroll (1000).
pub fn default_initial_bankroll() -> Decimal {
    Decimal::new(1000, 0)
}

/// One of the six colors painted on the dice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
    Yellow,
    White,
    Green,
    Pink,
}

impl Color {
    /// All colors in display order.
    pub const ALL: [Color; NUM_COLORS] = [
        Color::Red,
        Color::Blue,
        Color::Yellow,
        Color::White,
        Color::Green,
        Color::Pink,
    ];

    /// Position of the color in [`Color::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label.
    pub fn name(self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Blue => "Blue",
            Color::Yellow => "Yellow",
            Color::White => "White",
            Color::Green => "Green",
            Color::Pink => "Pink",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Color {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Color::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(label))
            .ok_or_else(|| GameError::InvalidCategory(label.to_string()))
    }
}

/// Errors raised by the game model and everything built on top of it.
#[derive(Debug, Error, PartialEq)]
pub enum GameError {
    /// Bet references a label outside the fixed color set.
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),
    /// Stake must be non-negative.
    #[error("invalid stake: {0}")]
    InvalidStake(Decimal),
    /// Stake exceeds the current bankroll.
    #[error("insufficient funds: stake {stake} exceeds bankroll {bankroll}")]
    InsufficientFunds { stake: Decimal, bankroll: Decimal },
    /// Malformed draw weights.
    #[error("invalid probability profile: {0}")]
    InvalidProfile(String),
    /// Bankroll, payout modifier or dice count out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Numeric conversion to floating point failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
    /// Money arithmetic exceeded the representable range.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Per-color draw weights used when rolling the dice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbabilityProfile {
    /// Every color has weight 1/6.
    Uniform,
    /// `color` has `weight`; the other five split the remainder evenly.
    Biased { color: Color, weight: f64 },
    /// Explicit weight table in [`Color::ALL`] order.
    Custom { weights: [f64; NUM_COLORS] },
}

impl ProbabilityProfile {
    /// Biased profile, validated.
    pub fn biased(color: Color, weight: f64) -> Result<Self, GameError> {
        let profile = ProbabilityProfile::Biased { color, weight };
        profile.validate()?;
        Ok(profile)
    }

    /// Custom weight table, validated.
    pub fn custom(weights: [f64; NUM_COLORS]) -> Result<Self, GameError> {
        let profile = ProbabilityProfile::Custom { weights };
        profile.validate()?;
        Ok(profile)
    }

    /// Weights in [`Color::ALL`] order.
    pub fn weights(&self) -> [f64; NUM_COLORS] {
        match self {
            ProbabilityProfile::Uniform => [1.0 / NUM_COLORS as f64; NUM_COLORS],
            ProbabilityProfile::Biased { color, weight } => {
                let other = (1.0 - weight) / (NUM_COLORS - 1) as f64;
                let mut w = [other; NUM_COLORS];
                w[color.index()] = *weight;
                w
            }
            ProbabilityProfile::Custom { weights } => *weights,
        }
    }

    /// Draw weight of a single color.
    pub fn weight(&self, color: Color) -> f64 {
        self.weights()[color.index()]
    }

    /// The favored color, if this profile has one.
    pub fn distinguished(&self) -> Option<Color> {
        match self {
            ProbabilityProfile::Biased { color, .. } => Some(*color),
            _ => None,
        }
    }

    /// Check that weights are non-negative, finite and sum to one.
    pub fn validate(&self) -> Result<(), GameError> {
        if let ProbabilityProfile::Biased { weight, .. } = self {
            if !weight.is_finite() || *weight <= 0.0 || *weight >= 1.0 {
                return Err(GameError::InvalidProfile(format!(
                    "biased weight {weight} must lie in (0, 1)"
                )));
            }
        }
        let weights = self.weights();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GameError::InvalidProfile(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(GameError::InvalidProfile(format!(
                "weights sum to {sum}, expected 1"
            )));
        }
        Ok(())
    }
}

/// Static configuration of a game: money, dice and payout model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Bankroll at the start of every session (> 0).
    pub initial_bankroll: Decimal,
    /// Dice weights.
    pub profile: ProbabilityProfile,
    /// Multiplier on winning payouts, in (0, 1].
    pub payout_modifier: Decimal,
    /// Dice per round (>= 1).
    pub num_dice: usize,
}

impl GameConfig {
    /// Fair game: uniform dice and unmodified payouts.
    pub fn fair(initial_bankroll: Decimal) -> Self {
        Self {
            initial_bankroll,
            profile: ProbabilityProfile::Uniform,
            payout_modifier: Decimal::ONE,
            num_dice: DEFAULT_NUM_DICE,
        }
    }

    /// House-biased game: `house_color` drawn with `weight`, payouts scaled by `payout_modifier`.
    pub fn biased(
        initial_bankroll: Decimal,
        house_color: Color,
        weight: f64,
        payout_modifier: Decimal,
    ) -> Result<Self, GameError> {
        let cfg = Self {
            initial_bankroll,
            profile: ProbabilityProfile::Biased {
                color: house_color,
                weight,
            },
            payout_modifier,
            num_dice: DEFAULT_NUM_DICE,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate profile and scalar parameters.
    pub fn validate(&self) -> Result<(), GameError> {
        self.profile.validate()?;
        if self.initial_bankroll <= Decimal::ZERO {
            return Err(GameError::InvalidConfig(format!(
                "initial bankroll {} must be > 0",
                self.initial_bankroll
            )));
        }
        if self.payout_modifier <= Decimal::ZERO || self.payout_modifier > Decimal::ONE {
            return Err(GameError::InvalidConfig(format!(
                "payout modifier {} must lie in (0, 1]",
                self.payout_modifier
            )));
        }
        if self.num_dice == 0 {
            return Err(GameError::InvalidConfig(format!(
                "dice count {} must be >= 1",
                self.num_dice
            )));
        }
        Ok(())
    }
}

/// Colors shown by the dice after one roll, in die order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(pub Vec<Color>);

impl Outcome {
    /// Number of dice showing `color`.
    pub fn count(&self, color: Color) -> usize {
        self.0.iter().filter(|&&c| c == color).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Snapshot of one resolved round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub bet_color: Color,
    pub stake: Decimal,
    pub outcome: Outcome,
    pub match_count: usize,
    /// Positive when the player wins, `-stake` on a miss.
    pub net_winnings: Decimal,
    pub bankroll_after: Decimal,
    pub house_profit_after: Decimal,
}

/// Aggregate of one completed session. Field names are the column names
/// consumed by downstream tabular analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub net_profit: Decimal,
    pub house_profit: Decimal,
    pub rounds_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_wagered: Decimal,
}

impl SessionSummary {
    /// Derive a summary from a session's end state and round history.
    pub fn from_history(
        initial_bankroll: Decimal,
        final_bankroll: Decimal,
        house_profit: Decimal,
        history: &[RoundRecord],
    ) -> Self {
        let mut wins = 0u32;
        let mut losses = 0u32;
        let mut total_wagered = Decimal::ZERO;
        for r in history {
            if r.net_winnings > Decimal::ZERO {
                wins += 1;
            } else if r.net_winnings < Decimal::ZERO {
                losses += 1;
            }
            // Saturates instead of panicking on astronomically long runs.
            total_wagered = total_wagered.saturating_add(r.stake);
        }
        Self {
            initial_bankroll,
            final_bankroll,
            net_profit: final_bankroll - initial_bankroll,
            house_profit,
            rounds_played: history.len() as u32,
            wins,
            losses,
            total_wagered,
        }
    }

    /// True when the player finished with nothing left.
    pub fn is_bankrupt(&self) -> bool {
        self.final_bankroll.is_zero()
    }
}

/// A round record tagged with its position across many sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSample {
    pub game_index: usize,
    pub round_index: usize,
    #[serde(flatten)]
    pub record: RoundRecord,
}

/// Simulation run configuration, typically loaded from YAML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    pub initial_bankroll: Decimal,
    /// Sessions simulated per model.
    pub num_trials: usize,
    /// Round ceiling per session.
    pub max_rounds: usize,
    /// Stake placed every round.
    pub stake: Decimal,
    /// Betting strategy label, e.g. "random", "fixed:red", "follow_bias".
    pub strategy: String,
    pub house_color: Color,
    pub house_color_weight: f64,
    pub payout_modifier: Decimal,
    pub num_dice: usize,
    /// Sessions recorded round by round for trajectory output.
    pub detailed_games: usize,
    /// Spread trials over worker threads.
    pub parallel: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            initial_bankroll: default_initial_bankroll(),
            num_trials: 10_000,
            max_rounds: 100,
            stake: Decimal::new(10, 0),
            strategy: "random".to_string(),
            house_color: Color::Red,
            house_color_weight: DEFAULT_HOUSE_COLOR_WEIGHT,
            payout_modifier: default_payout_modifier(),
            num_dice: DEFAULT_NUM_DICE,
            detailed_games: 50,
            parallel: false,
        }
    }
}

impl SimConfig {
    /// Fair game built from this run configuration.
    pub fn fair_game(&self) -> Result<GameConfig, GameError> {
        let cfg = GameConfig {
            num_dice: self.num_dice,
            ..GameConfig::fair(self.initial_bankroll)
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// House-biased game built from this run configuration.
    pub fn biased_game(&self) -> Result<GameConfig, GameError> {
        let cfg = GameConfig {
            initial_bankroll: self.initial_bankroll,
            profile: ProbabilityProfile::Biased {
                color: self.house_color,
                weight: self.house_color_weight,
            },
            payout_modifier: self.payout_modifier,
            num_dice: self.num_dice,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate run-level parameters that do not belong to a single game.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.stake < Decimal::ZERO {
            return Err(GameError::InvalidStake(self.stake));
        }
        self.fair_game()?;
        self.biased_game()?;
        Ok(())
    }
}
