//! Impurity-based risk functions for split comparison and pruning.
//!
//! Every risk function shares one signature, [`RiskFunction::risk`], so split
//! search and pruning never depend on a particular metric. Classification
//! risks weight each side by its joint probability mass
//! `p[side, class] = prior[class] * count[side, class] / N[class]`, which makes
//! node risks additive over leaves and comparable across the whole tree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TreeError;
use crate::table::Task;

/// The labels reaching one side of a candidate partition (or one node).
#[derive(Debug, Clone, Copy)]
pub enum Labels<'a> {
    /// Per-class observation counts (classification).
    Counts(&'a [f64]),
    /// Response values (regression).
    Values(&'a [f64]),
}

/// Overall per-class counts `N` and prior class probabilities.
///
/// Regression trees carry an empty prior.
#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    totals: Vec<f64>,
    probs: Vec<f64>,
}

impl Prior {
    /// Prior equal to the empirical class frequencies of `totals`.
    #[must_use]
    pub fn empirical(totals: Vec<f64>) -> Self {
        let n: f64 = totals.iter().sum();
        let probs = totals
            .iter()
            .map(|&t| if n > 0.0 { t / n } else { 0.0 })
            .collect();
        Self { totals, probs }
    }

    /// Prior with explicit class probabilities, normalized to sum to one.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidPrior`] when the length differs from the
    /// class count, an entry is negative or non-finite, or the sum is zero.
    pub fn with_probs(totals: Vec<f64>, probs: &[f64]) -> Result<Self, TreeError> {
        if probs.len() != totals.len() {
            return Err(TreeError::InvalidPrior {
                reason: format!("expected {} entries, got {}", totals.len(), probs.len()),
            });
        }
        if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(TreeError::InvalidPrior {
                reason: "entries must be finite and non-negative".to_string(),
            });
        }
        let sum: f64 = probs.iter().sum();
        if sum <= 0.0 {
            return Err(TreeError::InvalidPrior {
                reason: "entries must not all be zero".to_string(),
            });
        }
        Ok(Self {
            totals,
            probs: probs.iter().map(|p| p / sum).collect(),
        })
    }

    /// Empty prior for regression.
    #[must_use]
    pub fn none() -> Self {
        Self {
            totals: Vec::new(),
            probs: Vec::new(),
        }
    }

    /// Overall per-class observation counts.
    #[must_use]
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    /// Prior class probabilities.
    #[must_use]
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// Joint probability mass of each class for one side's counts.
    fn joint(&self, counts: &[f64]) -> Vec<f64> {
        counts
            .iter()
            .zip(self.probs.iter().zip(&self.totals))
            .map(|(&count, (&prior, &total))| {
                if total > 0.0 {
                    prior * count / total
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Output of a risk function: one scalar, or one value per side.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskValue {
    /// A single scalar covering all sides.
    Total(f64),
    /// One risk per side, to be summed by the caller.
    PerSide(Vec<f64>),
}

impl RiskValue {
    /// Sum over sides (or the scalar itself).
    #[must_use]
    pub fn total(&self) -> f64 {
        match self {
            RiskValue::Total(v) => *v,
            RiskValue::PerSide(v) => v.iter().sum(),
        }
    }
}

/// A pluggable impurity/cost function.
///
/// `sides` holds either the two sides of a candidate split or a single node.
/// With `avg = false` classification risks return the mass-weighted risk of
/// each side; with `avg = true` they return the mass-weighted average.
pub trait RiskFunction: fmt::Debug + Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Whether this function can score responses of the given task.
    fn accepts(&self, task: Task) -> bool;

    /// Compute the risk of a partition.
    fn risk(&self, sides: &[Labels<'_>], prior: &Prior, avg: bool) -> RiskValue;

    /// Whether a single node gets a meaningful risk. Functions that only
    /// compare two sides cannot drive cost-complexity pruning.
    fn scores_nodes(&self) -> bool {
        true
    }
}

/// Built-in risk functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Criterion {
    /// Misclassification rate: `1 - max(p)`.
    Error,
    /// Gini index: `Σ p(1 - p)`.
    Gini,
    /// Information entropy: `-Σ p ln p`.
    Entropy,
    /// Breiman's twoing rule, a single scalar over both sides.
    Twoing,
    /// Sum of squared deviations from the mean.
    Sse,
    /// Sum of absolute deviations from the mean.
    Sae,
    /// Always zero; used as the prune risk of forest trees.
    Zero,
}

impl Criterion {
    /// Default split-search risk for a task.
    #[must_use]
    pub fn default_build(task: Task) -> Self {
        match task {
            Task::Classification => Criterion::Gini,
            Task::Regression => Criterion::Sse,
        }
    }

    /// Default pruning risk for a task.
    #[must_use]
    pub fn default_prune(task: Task) -> Self {
        match task {
            Task::Classification => Criterion::Error,
            Task::Regression => Criterion::Sse,
        }
    }

    fn class_impurity(self, cond: &[f64]) -> f64 {
        match self {
            Criterion::Error => 1.0 - cond.iter().copied().fold(0.0, f64::max),
            Criterion::Gini => cond.iter().map(|&p| p * (1.0 - p)).sum(),
            Criterion::Entropy => cond
                .iter()
                .filter(|&&p| p > 0.0)
                .map(|&p| -p * p.ln())
                .sum(),
            _ => 0.0,
        }
    }

    fn classification(self, sides: &[Labels<'_>], prior: &Prior, avg: bool) -> RiskValue {
        let joints: Vec<Vec<f64>> = sides
            .iter()
            .map(|side| match side {
                Labels::Counts(counts) => prior.joint(counts),
                Labels::Values(_) => Vec::new(),
            })
            .collect();
        let masses: Vec<f64> = joints.iter().map(|j| j.iter().sum()).collect();

        if self == Criterion::Twoing {
            return RiskValue::Total(twoing(&joints, &masses));
        }

        let per_side: Vec<f64> = joints
            .iter()
            .zip(&masses)
            .map(|(joint, &mass)| {
                if mass <= 0.0 {
                    return 0.0;
                }
                let cond: Vec<f64> = joint.iter().map(|&p| p / mass).collect();
                mass * self.class_impurity(&cond)
            })
            .collect();

        if avg {
            let total_mass: f64 = masses.iter().sum();
            let weighted: f64 = per_side.iter().sum();
            RiskValue::Total(if total_mass > 0.0 {
                weighted / total_mass
            } else {
                0.0
            })
        } else {
            RiskValue::PerSide(per_side)
        }
    }

    fn regression(self, sides: &[Labels<'_>]) -> f64 {
        sides
            .iter()
            .map(|side| match side {
                Labels::Values(values) if !values.is_empty() => {
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    match self {
                        Criterion::Sse => values.iter().map(|v| (v - mean).powi(2)).sum::<f64>(),
                        _ => values.iter().map(|v| (v - mean).abs()).sum::<f64>(),
                    }
                }
                _ => 0.0,
            })
            .sum()
    }
}

/// `-(mL/mT)(mR/mT)(Σ|p(c|L) - p(c|R)|)² / 4`; zero unless both sides carry mass.
fn twoing(joints: &[Vec<f64>], masses: &[f64]) -> f64 {
    let [left, right] = joints else {
        return 0.0;
    };
    let (m_left, m_right) = (masses[0], masses[1]);
    let m_total = m_left + m_right;
    if m_left <= 0.0 || m_right <= 0.0 {
        return 0.0;
    }
    let spread: f64 = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| (l / m_left - r / m_right).abs())
        .sum();
    -(m_left / m_total) * (m_right / m_total) * spread * spread / 4.0
}

impl RiskFunction for Criterion {
    fn name(&self) -> &str {
        match self {
            Criterion::Error => "error",
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
            Criterion::Twoing => "twoing",
            Criterion::Sse => "sse",
            Criterion::Sae => "sae",
            Criterion::Zero => "zero",
        }
    }

    fn accepts(&self, task: Task) -> bool {
        match self {
            Criterion::Error | Criterion::Gini | Criterion::Entropy | Criterion::Twoing => {
                task == Task::Classification
            }
            Criterion::Sse | Criterion::Sae => task == Task::Regression,
            Criterion::Zero => true,
        }
    }

    fn scores_nodes(&self) -> bool {
        !matches!(self, Criterion::Twoing | Criterion::Zero)
    }

    fn risk(&self, sides: &[Labels<'_>], prior: &Prior, avg: bool) -> RiskValue {
        match self {
            Criterion::Zero => RiskValue::Total(0.0),
            Criterion::Sse | Criterion::Sae => RiskValue::Total(self.regression(sides)),
            _ => self.classification(sides, prior, avg),
        }
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Criterion::Error),
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            "twoing" => Ok(Criterion::Twoing),
            "sse" => Ok(Criterion::Sse),
            "sae" => Ok(Criterion::Sae),
            "zero" => Ok(Criterion::Zero),
            other => Err(format!(
                "unknown risk function: {other} (expected error, gini, entropy, twoing, sse, sae or zero)"
            )),
        }
    }
}

/// Build-time and prune-time risk functions plus an optional class prior.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    build: Arc<dyn RiskFunction>,
    prune: Arc<dyn RiskFunction>,
    prior: Option<Vec<f64>>,
}

impl RiskConfig {
    /// Pair a split-search risk with a pruning risk.
    #[must_use]
    pub fn new(build: Arc<dyn RiskFunction>, prune: Arc<dyn RiskFunction>) -> Self {
        Self {
            build,
            prune,
            prior: None,
        }
    }

    /// Default risks for a task (gini/error or sse/sse).
    #[must_use]
    pub fn for_task(task: Task) -> Self {
        Self::new(
            Arc::new(Criterion::default_build(task)),
            Arc::new(Criterion::default_prune(task)),
        )
    }

    /// Set explicit class prior probabilities.
    #[must_use]
    pub fn with_prior(mut self, prior: Option<Vec<f64>>) -> Self {
        self.prior = prior;
        self
    }

    /// Return the split-search risk.
    #[must_use]
    pub fn build(&self) -> &dyn RiskFunction {
        self.build.as_ref()
    }

    /// Return the pruning risk.
    #[must_use]
    pub fn prune(&self) -> &dyn RiskFunction {
        self.prune.as_ref()
    }

    /// Return the explicit prior, if any.
    #[must_use]
    pub fn prior(&self) -> Option<&[f64]> {
        self.prior.as_deref()
    }

    /// Reject risk functions that cannot score `task`.
    pub(crate) fn check_task(&self, task: Task) -> Result<(), TreeError> {
        for risk in [self.build(), self.prune()] {
            if !risk.accepts(task) {
                return Err(TreeError::RiskTaskMismatch {
                    risk: risk.name().to_string(),
                    task,
                });
            }
        }
        Ok(())
    }

    /// Resolve the prior for a response with the given per-class totals.
    pub(crate) fn resolve_prior(&self, totals: Vec<f64>) -> Result<Prior, TreeError> {
        match &self.prior {
            Some(probs) => Prior::with_probs(totals, probs),
            None => Ok(Prior::empirical(totals)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior_2() -> Prior {
        Prior::empirical(vec![10.0, 10.0])
    }

    #[test]
    fn gini_pure_side_contributes_zero() {
        let left = [5.0, 0.0];
        let right = [5.0, 10.0];
        let value = Criterion::Gini.risk(
            &[Labels::Counts(&left), Labels::Counts(&right)],
            &prior_2(),
            false,
        );
        let RiskValue::PerSide(sides) = value else {
            panic!("expected per-side risk");
        };
        assert!(sides[0].abs() < f64::EPSILON);
        assert!(sides[1] > 0.0);
    }

    #[test]
    fn error_and_gini_single_class_node_is_zero() {
        let node = [0.0, 7.0];
        for criterion in [Criterion::Error, Criterion::Gini, Criterion::Entropy] {
            let v = criterion.risk(&[Labels::Counts(&node)], &prior_2(), true);
            assert!(v.total().abs() < f64::EPSILON, "{criterion:?}");
        }
    }

    #[test]
    fn gini_balanced_node() {
        let node = [10.0, 10.0];
        let avg = Criterion::Gini.risk(&[Labels::Counts(&node)], &prior_2(), true);
        assert!((avg.total() - 0.5).abs() < 1e-12);
        // Whole-data node has mass 1, so the unaveraged risk is the same.
        let raw = Criterion::Gini.risk(&[Labels::Counts(&node)], &prior_2(), false);
        assert!((raw.total() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn error_rate_is_mass_weighted() {
        // Left: 5 of class 0, 1 of class 1; mass 6/20, error 1/6.
        let left = [5.0, 1.0];
        let right = [5.0, 9.0];
        let v = Criterion::Error.risk(
            &[Labels::Counts(&left), Labels::Counts(&right)],
            &prior_2(),
            false,
        );
        let RiskValue::PerSide(sides) = v else {
            panic!("expected per-side risk");
        };
        assert!((sides[0] - 1.0 / 20.0).abs() < 1e-12);
        assert!((sides[1] - 5.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn entropy_treats_zero_log_zero_as_zero() {
        let node = [10.0, 0.0];
        let v = Criterion::Entropy.risk(&[Labels::Counts(&node)], &prior_2(), true);
        assert!(v.total().is_finite());
        assert!(v.total().abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_balanced_is_ln2() {
        let node = [10.0, 10.0];
        let v = Criterion::Entropy.risk(&[Labels::Counts(&node)], &prior_2(), true);
        assert!((v.total() - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn empty_side_contributes_zero() {
        let left = [0.0, 0.0];
        let right = [10.0, 10.0];
        let v = Criterion::Gini.risk(
            &[Labels::Counts(&left), Labels::Counts(&right)],
            &prior_2(),
            false,
        );
        assert_eq!(v, RiskValue::PerSide(vec![0.0, 0.5]));
    }

    #[test]
    fn twoing_perfect_split_is_most_negative() {
        let perfect = Criterion::Twoing.risk(
            &[Labels::Counts(&[10.0, 0.0]), Labels::Counts(&[0.0, 10.0])],
            &prior_2(),
            false,
        );
        let mixed = Criterion::Twoing.risk(
            &[Labels::Counts(&[5.0, 5.0]), Labels::Counts(&[5.0, 5.0])],
            &prior_2(),
            false,
        );
        // (1/2)(1/2)(2)^2/4 = 0.25
        assert!((perfect.total() + 0.25).abs() < 1e-12);
        assert!(mixed.total().abs() < 1e-12);
        // Ignores avg.
        let avg = Criterion::Twoing.risk(
            &[Labels::Counts(&[10.0, 0.0]), Labels::Counts(&[0.0, 10.0])],
            &prior_2(),
            true,
        );
        assert_eq!(perfect, avg);
    }

    #[test]
    fn prior_reweights_classes() {
        let prior = Prior::with_probs(vec![10.0, 10.0], &[3.0, 1.0]).unwrap();
        assert_eq!(prior.probs(), &[0.75, 0.25]);
        let node = [10.0, 10.0];
        let v = Criterion::Error.risk(&[Labels::Counts(&node)], &prior, true);
        assert!((v.total() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn invalid_prior_rejected() {
        assert!(Prior::with_probs(vec![1.0, 1.0], &[1.0]).is_err());
        assert!(Prior::with_probs(vec![1.0, 1.0], &[-1.0, 2.0]).is_err());
        assert!(Prior::with_probs(vec![1.0, 1.0], &[0.0, 0.0]).is_err());
    }

    #[test]
    fn sse_sums_across_subsets() {
        let left = [1.0, 3.0];
        let right = [10.0];
        let v = Criterion::Sse.risk(&[Labels::Values(&left), Labels::Values(&right)], &Prior::none(), false);
        assert!((v.total() - 2.0).abs() < 1e-12);
        let single = Criterion::Sse.risk(&[Labels::Values(&[1.0, 3.0, 10.0])], &Prior::none(), true);
        assert!(single.total() > v.total());
    }

    #[test]
    fn sae_uses_mean_deviation() {
        let v = Criterion::Sae.risk(&[Labels::Values(&[1.0, 2.0, 6.0])], &Prior::none(), false);
        // mean 3: |−2| + |−1| + |3| = 6
        assert!((v.total() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn zero_risk_accepts_everything() {
        assert!(Criterion::Zero.accepts(Task::Classification));
        assert!(Criterion::Zero.accepts(Task::Regression));
        let v = Criterion::Zero.risk(&[Labels::Counts(&[1.0, 2.0])], &prior_2(), false);
        assert_eq!(v.total(), 0.0);
    }

    #[test]
    fn task_mismatch_rejected() {
        let config = RiskConfig::new(Arc::new(Criterion::Sse), Arc::new(Criterion::Error));
        let err = config.check_task(Task::Classification).unwrap_err();
        assert!(matches!(err, TreeError::RiskTaskMismatch { .. }));
    }

    #[test]
    fn parse_names() {
        assert_eq!("gini".parse::<Criterion>().unwrap(), Criterion::Gini);
        assert!("median".parse::<Criterion>().is_err());
    }
}
