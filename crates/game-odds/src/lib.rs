#![deny(warnings)]

//! Odds model for the Color Game: dice sampling, round resolution and the
//! closed-form house edge.
//!
//! This crate provides:
//! - A weighted dice sampler shared by every probability profile
//! - The payout rule mapping matches to net winnings
//! - Exact match-count distributions and expected returns per unit stake

use game_core::{Color, GameConfig, GameError, Outcome, ProbabilityProfile};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Weighted dice roller built once from a validated profile.
#[derive(Clone, Debug)]
pub struct DiceSampler {
    index: WeightedIndex<f64>,
}

impl DiceSampler {
    /// Validate `profile` and precompute its sampling table.
    pub fn new(profile: &ProbabilityProfile) -> Result<Self, GameError> {
        profile.validate()?;
        let index = WeightedIndex::new(profile.weights())
            .map_err(|e| GameError::InvalidProfile(e.to_string()))?;
        debug!(?profile, "dice sampler ready");
        Ok(Self { index })
    }

    /// Roll `n` dice independently, with replacement.
    pub fn draw<R: Rng>(&self, n: usize, rng: &mut R) -> Outcome {
        Outcome(
            (0..n)
                .map(|_| Color::ALL[self.index.sample(rng)])
                .collect(),
        )
    }
}

/// One-shot roll of `n` dice under `profile`.
///
/// Fails with `InvalidProfile` when the weights are malformed. Callers
/// rolling repeatedly should keep a [`DiceSampler`] instead.
pub fn draw<R: Rng>(
    profile: &ProbabilityProfile,
    n: usize,
    rng: &mut R,
) -> Result<Outcome, GameError> {
    Ok(DiceSampler::new(profile)?.draw(n, rng))
}

/// Number of dice in `outcome` showing `bet`.
pub fn match_count(bet: Color, outcome: &Outcome) -> usize {
    outcome.count(bet)
}

/// Stake multiple paid for `matches` hits before the payout modifier:
/// -1 for a miss, otherwise one unit per matching die.
pub fn payout_factor(matches: usize) -> i64 {
    if matches == 0 {
        -1
    } else {
        i64::try_from(matches).unwrap_or(i64::MAX)
    }
}

/// Resolve a bet against rolled dice.
///
/// Returns `(net_winnings, match_count)`. A miss loses the stake; `m` hits
/// win `m * stake * payout_modifier`. Zero stake resolves to zero. A win too
/// large for [`Decimal`] fails with `Overflow`.
pub fn resolve(
    bet: Color,
    outcome: &Outcome,
    stake: Decimal,
    payout_modifier: Decimal,
) -> Result<(Decimal, usize), GameError> {
    if stake < Decimal::ZERO {
        return Err(GameError::InvalidStake(stake));
    }
    let matches = match_count(bet, outcome);
    let factor = Decimal::from(payout_factor(matches));
    let net = if matches == 0 {
        stake.checked_mul(factor)
    } else {
        stake
            .checked_mul(factor)
            .and_then(|win| win.checked_mul(payout_modifier))
    };
    Ok((net.ok_or(GameError::Overflow)?, matches))
}

/// Binomial coefficient C(n, k) as a float.
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// P(m matches) for m in 0..=n when each die shows the bet color with probability `p`.
pub fn match_distribution(p: f64, n: usize) -> Vec<f64> {
    (0..=n)
        .map(|m| binomial(n, m) * p.powi(m as i32) * (1.0 - p).powi((n - m) as i32))
        .collect()
}

/// Expected net winnings per unit stake for a bet hit with probability `p` per die.
pub fn expected_return(p: f64, payout_modifier: f64, n: usize) -> f64 {
    match_distribution(p, n)
        .iter()
        .enumerate()
        .map(|(m, pm)| {
            let factor = payout_factor(m) as f64;
            if m == 0 {
                pm * factor
            } else {
                pm * factor * payout_modifier
            }
        })
        .sum()
}

/// House edge when always betting `bet`: the negated expected return.
pub fn house_edge(profile: &ProbabilityProfile, bet: Color, payout_modifier: f64, n: usize) -> f64 {
    -expected_return(profile.weight(bet), payout_modifier, n)
}

/// House edge faced by a player picking a color uniformly at random each round.
pub fn house_edge_random_bettor(profile: &ProbabilityProfile, payout_modifier: f64, n: usize) -> f64 {
    let total: f64 = Color::ALL
        .iter()
        .map(|c| house_edge(profile, *c, payout_modifier, n))
        .sum();
    total / Color::ALL.len() as f64
}

/// Theoretical house edge of `config` for a player always betting `bet`.
pub fn theoretical_house_edge(config: &GameConfig, bet: Color) -> Result<f64, GameError> {
    let k = config.payout_modifier.to_f64().ok_or(GameError::NonFinite)?;
    Ok(house_edge(&config.profile, bet, k, config.num_dice))
}

/// Theoretical house edge of `config` for a uniformly random bettor.
pub fn theoretical_house_edge_random(config: &GameConfig) -> Result<f64, GameError> {
    let k = config.payout_modifier.to_f64().ok_or(GameError::NonFinite)?;
    Ok(house_edge_random_bettor(&config.profile, k, config.num_dice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::{default_initial_bankroll, default_payout_modifier};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn outcome_with_matches(bet: Color, matches: usize) -> Outcome {
        let other = if bet == Color::Red {
            Color::Blue
        } else {
            Color::Red
        };
        let mut dice = vec![bet; matches];
        dice.resize(3, other);
        Outcome(dice)
    }

    #[test]
    fn payout_table_fair() {
        let stake = Decimal::new(10, 0);
        let k = Decimal::ONE;
        let expect = [-10, 10, 20, 30];
        for (m, want) in expect.iter().enumerate() {
            let (net, got_m) = resolve(Color::Red, &outcome_with_matches(Color::Red, m), stake, k)
                .unwrap();
            assert_eq!(got_m, m);
            assert_eq!(net, Decimal::new(*want, 0));
        }
    }

    #[test]
    fn payout_table_modified() {
        let stake = Decimal::new(10, 0);
        let k = default_payout_modifier();
        let expect = [
            Decimal::new(-10, 0),
            Decimal::new(95, 1),
            Decimal::new(19, 0),
            Decimal::new(285, 1),
        ];
        for (m, want) in expect.iter().enumerate() {
            let (net, _) =
                resolve(Color::Pink, &outcome_with_matches(Color::Pink, m), stake, k).unwrap();
            assert_eq!(net, *want);
        }
    }

    #[test]
    fn zero_stake_is_a_no_op() {
        for m in 0..=3 {
            let (net, _) = resolve(
                Color::Green,
                &outcome_with_matches(Color::Green, m),
                Decimal::ZERO,
                Decimal::ONE,
            )
            .unwrap();
            assert!(net.is_zero());
        }
    }

    #[test]
    fn negative_stake_rejected() {
        let err = resolve(
            Color::Red,
            &outcome_with_matches(Color::Red, 1),
            Decimal::new(-1, 0),
            Decimal::ONE,
        )
        .unwrap_err();
        assert_eq!(err, GameError::InvalidStake(Decimal::new(-1, 0)));
    }

    #[test]
    fn match_counts_are_not_truncated() {
        let (net, m) =
            resolve(Color::Red, &Outcome(vec![Color::Red; 256]), Decimal::ONE, Decimal::ONE)
                .unwrap();
        assert_eq!(m, 256);
        assert_eq!(net, Decimal::new(256, 0));
        assert_eq!(payout_factor(256), 256);

        // E = k * n * p - (1 - p)^n for the linear payout.
        let p: f64 = 1.0 / 6.0;
        let want = 300.0 * p - (1.0 - p).powi(300);
        assert!((expected_return(p, 1.0, 300) - want).abs() < 1e-6);
    }

    #[test]
    fn oversized_win_overflows_instead_of_panicking() {
        let outcome = outcome_with_matches(Color::Red, 2);
        assert_eq!(
            resolve(Color::Red, &outcome, Decimal::MAX, Decimal::ONE),
            Err(GameError::Overflow)
        );
        assert_eq!(
            resolve(Color::Red, &outcome, Decimal::MAX, default_payout_modifier()),
            Err(GameError::Overflow)
        );
        // A miss only negates the stake, which always fits.
        let (net, _) = resolve(
            Color::Red,
            &outcome_with_matches(Color::Red, 0),
            Decimal::MAX,
            Decimal::ONE,
        )
        .unwrap();
        assert_eq!(net, -Decimal::MAX);
    }

    #[test]
    fn fair_edge_is_17_over_216_exhaustively() {
        // Every one of the 216 equally likely rolls, unit stake on Red.
        let mut total = Decimal::ZERO;
        for a in Color::ALL {
            for b in Color::ALL {
                for c in Color::ALL {
                    let (net, _) =
                        resolve(Color::Red, &Outcome(vec![a, b, c]), Decimal::ONE, Decimal::ONE)
                            .unwrap();
                    total += net;
                }
            }
        }
        assert_eq!(total, Decimal::new(-17, 0));
    }

    #[test]
    fn fair_edge_closed_form() {
        let dist = match_distribution(1.0 / 6.0, 3);
        let expect = [125.0, 75.0, 15.0, 1.0];
        for (p, e) in dist.iter().zip(expect) {
            assert!((p * 216.0 - e).abs() < 1e-9);
        }
        let edge = house_edge(&ProbabilityProfile::Uniform, Color::Yellow, 1.0, 3);
        assert!((edge - 17.0 / 216.0).abs() < 1e-12);
        let cfg = GameConfig::fair(default_initial_bankroll());
        let random = theoretical_house_edge_random(&cfg).unwrap();
        assert!((random - 17.0 / 216.0).abs() < 1e-12);
    }

    #[test]
    fn biased_edge_closed_form() {
        let dist = match_distribution(0.20, 3);
        let expect = [0.512, 0.384, 0.096, 0.008];
        for (p, e) in dist.iter().zip(expect) {
            assert!((p - e).abs() < 1e-12);
        }
        assert!((expected_return(0.20, 0.95, 3) - 0.058).abs() < 1e-12);

        let cfg = GameConfig::biased(
            default_initial_bankroll(),
            Color::Red,
            0.20,
            default_payout_modifier(),
        )
        .unwrap();
        // Betting the favored color tilts the odds toward the player.
        let on_house = theoretical_house_edge(&cfg, Color::Red).unwrap();
        assert!((on_house + 0.058).abs() < 1e-12);
        let off_house = theoretical_house_edge(&cfg, Color::Blue).unwrap();
        assert!((off_house - 0.136704).abs() < 1e-12);
        let random = theoretical_house_edge_random(&cfg).unwrap();
        assert!((random - (-0.058 + 5.0 * 0.136704) / 6.0).abs() < 1e-12);
        assert!(random > 17.0 / 216.0);
    }

    #[test]
    fn match_distribution_sums_to_one() {
        for n in 1..8 {
            let s: f64 = match_distribution(0.3, n).iter().sum();
            assert!((s - 1.0).abs() < 1e-12);
        }
        assert_eq!(binomial(3, 4), 0.0);
        assert_eq!(binomial(5, 2), 10.0);
    }

    #[test]
    fn draw_is_seeded_and_sized() {
        let profile = ProbabilityProfile::Uniform;
        let mut r1 = ChaCha8Rng::seed_from_u64(42);
        let mut r2 = ChaCha8Rng::seed_from_u64(42);
        let a = draw(&profile, 3, &mut r1).unwrap();
        let b = draw(&profile, 3, &mut r2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn draw_rejects_malformed_profile() {
        let bad = ProbabilityProfile::Custom {
            weights: [0.5, 0.5, 0.5, 0.0, 0.0, 0.0],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            draw(&bad, 3, &mut rng),
            Err(GameError::InvalidProfile(_))
        ));
    }

    #[test]
    fn zero_weight_color_never_drawn() {
        let profile =
            ProbabilityProfile::custom([0.0, 0.2, 0.2, 0.2, 0.2, 0.2]).unwrap();
        let sampler = DiceSampler::new(&profile).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..1000 {
            assert_eq!(sampler.draw(3, &mut rng).count(Color::Red), 0);
        }
    }

    #[test]
    fn biased_sampler_frequency_tracks_weight() {
        let profile = ProbabilityProfile::biased(Color::Red, 0.20).unwrap();
        let sampler = DiceSampler::new(&profile).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let rolls = 60_000;
        let mut reds = 0usize;
        for _ in 0..rolls {
            reds += sampler.draw(1, &mut rng).count(Color::Red);
        }
        let freq = reds as f64 / rolls as f64;
        assert!((freq - 0.20).abs() < 0.01, "red frequency {freq}");
    }

    proptest! {
        #[test]
        fn resolve_matches_payout_table(cents in 0i64..1_000_000, m in 0usize..=3, k_bp in 1i64..=10_000) {
            let stake = Decimal::new(cents, 2);
            let k = Decimal::new(k_bp, 4);
            let (net, got) = resolve(Color::White, &outcome_with_matches(Color::White, m), stake, k).unwrap();
            prop_assert_eq!(got, m);
            if m == 0 {
                prop_assert_eq!(net, -stake);
            } else {
                prop_assert_eq!(net, stake * Decimal::from(m as i64) * k);
            }
        }

        #[test]
        fn edge_grows_as_modifier_shrinks(k1 in 0.5f64..1.0, dk in 0.01f64..0.4) {
            let k2 = (k1 - dk).max(0.01);
            let e1 = house_edge(&ProbabilityProfile::Uniform, Color::Red, k1, 3);
            let e2 = house_edge(&ProbabilityProfile::Uniform, Color::Red, k2, 3);
            prop_assert!(e2 > e1);
        }
    }
}
