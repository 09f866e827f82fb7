#![deny(warnings)]

//! Statistical analysis of simulated session tables.
//!
//! Consumes [`SessionSummary`] rows produced by the runtime and derives:
//! - Profit summary statistics, ROI and distribution shape per model
//! - Empirical house edge (house profit over amount wagered)
//! - Two-sample tests comparing a fair and a biased model

use game_core::SessionSummary;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Significance level used for every hypothesis test.
pub const ALPHA: f64 = 0.05;

/// Errors produced by the analysis helpers.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    /// Statistics need at least one session.
    #[error("sample is empty")]
    EmptySample,
    /// House edge is undefined when nothing was wagered.
    #[error("no money was wagered")]
    NothingWagered,
    /// Numeric conversion to floating point failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

fn to_f64(d: Decimal) -> Result<f64, AnalysisError> {
    d.to_f64().ok_or(AnalysisError::NonFinite)
}

fn column<F>(summaries: &[SessionSummary], f: F) -> Result<Vec<f64>, AnalysisError>
where
    F: Fn(&SessionSummary) -> Decimal,
{
    if summaries.is_empty() {
        return Err(AnalysisError::EmptySample);
    }
    summaries.iter().map(|s| to_f64(f(s))).collect()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 below two observations.
pub fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Quantile `q` in [0, 1] of sorted data, linearly interpolated between
/// the closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

fn central_moment(xs: &[f64], m: f64, k: i32) -> f64 {
    xs.iter().map(|x| (x - m).powi(k)).sum::<f64>() / xs.len() as f64
}

/// Biased sample skewness; 0 for constant data.
pub fn skewness(xs: &[f64]) -> f64 {
    let m = mean(xs);
    let m2 = central_moment(xs, m, 2);
    if xs.is_empty() || m2 == 0.0 {
        return 0.0;
    }
    central_moment(xs, m, 3) / m2.powf(1.5)
}

/// Biased excess kurtosis; 0 for constant data.
pub fn kurtosis(xs: &[f64]) -> f64 {
    let m = mean(xs);
    let m2 = central_moment(xs, m, 2);
    if xs.is_empty() || m2 == 0.0 {
        return 0.0;
    }
    central_moment(xs, m, 4) / (m2 * m2) - 3.0
}

/// Profit and activity statistics over one model's sessions.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub mean_profit: f64,
    pub median_profit: f64,
    pub std_profit: f64,
    pub min_profit: f64,
    pub max_profit: f64,
    /// Share of sessions ending with a positive net profit.
    pub win_rate: f64,
    pub avg_house_profit: f64,
    pub total_house_profit: f64,
    pub avg_rounds_played: f64,
    /// Share of sessions ending with an empty bankroll.
    pub bankruptcy_rate: f64,
    pub avg_total_wagered: f64,
}

impl SummaryStatistics {
    pub fn from_summaries(summaries: &[SessionSummary]) -> Result<Self, AnalysisError> {
        let profit = column(summaries, |s| s.net_profit)?;
        let house = column(summaries, |s| s.house_profit)?;
        let wagered = column(summaries, |s| s.total_wagered)?;
        let n = summaries.len() as f64;
        let sorted_profit = sorted(&profit);
        let rounds: f64 = summaries.iter().map(|s| s.rounds_played as f64).sum();
        let winners = summaries
            .iter()
            .filter(|s| s.net_profit > Decimal::ZERO)
            .count();
        let bankrupt = summaries.iter().filter(|s| s.is_bankrupt()).count();
        Ok(Self {
            mean_profit: mean(&profit),
            median_profit: percentile(&sorted_profit, 0.5),
            std_profit: sample_std(&profit),
            min_profit: sorted_profit[0],
            max_profit: sorted_profit[sorted_profit.len() - 1],
            win_rate: winners as f64 / n,
            avg_house_profit: mean(&house),
            total_house_profit: house.iter().sum(),
            avg_rounds_played: rounds / n,
            bankruptcy_rate: bankrupt as f64 / n,
            avg_total_wagered: mean(&wagered),
        })
    }
}

/// Pooled house profit divided by pooled amount wagered.
pub fn empirical_house_edge(summaries: &[SessionSummary]) -> Result<f64, AnalysisError> {
    if summaries.is_empty() {
        return Err(AnalysisError::EmptySample);
    }
    let house: Decimal = summaries.iter().map(|s| s.house_profit).sum();
    let wagered: Decimal = summaries.iter().map(|s| s.total_wagered).sum();
    if wagered.is_zero() {
        return Err(AnalysisError::NothingWagered);
    }
    to_f64(house / wagered)
}

/// Return on investment in percent of the initial bankroll.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoiStatistics {
    pub mean_roi: f64,
    pub median_roi: f64,
    pub std_roi: f64,
    pub min_roi: f64,
    pub max_roi: f64,
}

impl RoiStatistics {
    pub fn from_summaries(summaries: &[SessionSummary]) -> Result<Self, AnalysisError> {
        let mut roi = Vec::with_capacity(summaries.len());
        for s in summaries {
            let initial = to_f64(s.initial_bankroll)?;
            if initial == 0.0 {
                return Err(AnalysisError::NonFinite);
            }
            roi.push(to_f64(s.net_profit)? / initial * 100.0);
        }
        if roi.is_empty() {
            return Err(AnalysisError::EmptySample);
        }
        let sorted_roi = sorted(&roi);
        Ok(Self {
            mean_roi: mean(&roi),
            median_roi: percentile(&sorted_roi, 0.5),
            std_roi: sample_std(&roi),
            min_roi: sorted_roi[0],
            max_roi: sorted_roi[sorted_roi.len() - 1],
        })
    }
}

/// Shape of the net profit distribution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionStatistics {
    pub skewness: f64,
    pub kurtosis: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
}

impl DistributionStatistics {
    pub fn from_summaries(summaries: &[SessionSummary]) -> Result<Self, AnalysisError> {
        let profit = column(summaries, |s| s.net_profit)?;
        let s = sorted(&profit);
        Ok(Self {
            skewness: skewness(&profit),
            kurtosis: kurtosis(&profit),
            percentile_5: percentile(&s, 0.05),
            percentile_25: percentile(&s, 0.25),
            percentile_50: percentile(&s, 0.50),
            percentile_75: percentile(&s, 0.75),
            percentile_95: percentile(&s, 0.95),
        })
    }
}

/// Outcome of a two-sided hypothesis test.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
    /// `p_value < ALPHA`.
    pub significant: bool,
}

impl TestResult {
    fn new(statistic: f64, p_value: f64) -> Self {
        let p_value = p_value.clamp(0.0, 1.0);
        Self {
            statistic,
            p_value,
            significant: p_value < ALPHA,
        }
    }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    // Abramowitz and Stegun 7.1.26
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

fn two_sided_p(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// Pooled-variance two-sample t-test of equal means.
///
/// The p-value uses the normal approximation to the t distribution, which
/// is tight at the sample sizes Monte Carlo runs produce.
pub fn t_test(a: &[f64], b: &[f64]) -> Result<TestResult, AnalysisError> {
    if a.is_empty() || b.is_empty() || a.len() + b.len() < 3 {
        return Err(AnalysisError::EmptySample);
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let diff = mean(a) - mean(b);
    let va = sample_std(a).powi(2);
    let vb = sample_std(b).powi(2);
    let pooled = ((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0);
    let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    if se == 0.0 {
        return Ok(if diff == 0.0 {
            TestResult::new(0.0, 1.0)
        } else {
            TestResult::new(diff.signum() * f64::INFINITY, 0.0)
        });
    }
    let t = diff / se;
    Ok(TestResult::new(t, two_sided_p(t)))
}

/// Average ranks (1-based) of `values`, ties sharing the mean of their ranks.
fn average_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let avg = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

/// Mann-Whitney U test; the statistic is U for sample `a`.
///
/// p-value from the tie-corrected normal approximation with continuity
/// correction.
pub fn mann_whitney(a: &[f64], b: &[f64]) -> Result<TestResult, AnalysisError> {
    if a.is_empty() || b.is_empty() {
        return Err(AnalysisError::EmptySample);
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let n = na + nb;
    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = average_ranks(&combined);
    let rank_sum_a: f64 = ranks[..a.len()].iter().sum();
    let u = rank_sum_a - na * (na + 1.0) / 2.0;
    let mu = na * nb / 2.0;
    let var = na * nb / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if var <= 0.0 {
        return Ok(TestResult::new(u, 1.0));
    }
    let z = ((u - mu).abs() - 0.5).max(0.0) / var.sqrt();
    Ok(TestResult::new(u, two_sided_p(z)))
}

/// Everything computed for a single model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelReport {
    pub summary: SummaryStatistics,
    pub house_edge: f64,
    pub roi: RoiStatistics,
    pub distribution: DistributionStatistics,
}

/// Analyze one model's sessions.
pub fn analyze(summaries: &[SessionSummary]) -> Result<ModelReport, AnalysisError> {
    Ok(ModelReport {
        summary: SummaryStatistics::from_summaries(summaries)?,
        house_edge: empirical_house_edge(summaries)?,
        roi: RoiStatistics::from_summaries(summaries)?,
        distribution: DistributionStatistics::from_summaries(summaries)?,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HouseEdgeComparison {
    pub fair: f64,
    pub biased: f64,
    /// `biased - fair`.
    pub difference: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HypothesisTests {
    pub t_test: TestResult,
    pub mann_whitney: TestResult,
}

/// Fair-versus-biased comparison of net profit per session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub fair: ModelReport,
    pub biased: ModelReport,
    pub house_edge: HouseEdgeComparison,
    pub hypothesis: HypothesisTests,
}

pub fn compare(
    fair: &[SessionSummary],
    biased: &[SessionSummary],
) -> Result<ComparisonReport, AnalysisError> {
    let fair_report = analyze(fair)?;
    let biased_report = analyze(biased)?;
    let fair_profit = column(fair, |s| s.net_profit)?;
    let biased_profit = column(biased, |s| s.net_profit)?;
    let hypothesis = HypothesisTests {
        t_test: t_test(&fair_profit, &biased_profit)?,
        mann_whitney: mann_whitney(&fair_profit, &biased_profit)?,
    };
    let house_edge = HouseEdgeComparison {
        fair: fair_report.house_edge,
        biased: biased_report.house_edge,
        difference: biased_report.house_edge - fair_report.house_edge,
    };
    debug!(
        fair_edge = house_edge.fair,
        biased_edge = house_edge.biased,
        t = hypothesis.t_test.statistic,
        "model comparison computed"
    );
    Ok(ComparisonReport {
        fair: fair_report,
        biased: biased_report,
        house_edge,
        hypothesis,
    })
}
