//! Best-split search over mixed categorical/numeric covariates, and the
//! left-branch predicate shared by search, induction and prediction.

use rand::Rng;

use crate::risk::{Labels, Prior, RiskFunction};
use crate::table::Column;

/// Maximum number of levels a categorical covariate may declare.
///
/// Subset enumeration visits `2^(L-1) - 1` candidates per node.
pub const MAX_CATEGORICAL_LEVELS: usize = 20;

/// Sorted set of categorical level codes that go left.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LevelSet(Vec<usize>);

impl LevelSet {
    /// Build a set from level codes (sorted and de-duplicated).
    #[must_use]
    pub fn new(mut codes: Vec<usize>) -> Self {
        codes.sort_unstable();
        codes.dedup();
        Self(codes)
    }

    /// Return `true` if `code` is in the set.
    #[must_use]
    pub fn contains(&self, code: usize) -> bool {
        self.0.binary_search(&code).is_ok()
    }

    /// Return the level codes in ascending order.
    #[must_use]
    pub fn codes(&self) -> &[usize] {
        &self.0
    }
}

/// Where a split sends observations left.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitPoint {
    /// Numeric covariate: `x <= threshold` goes left.
    Threshold(f64),
    /// Categorical covariate: `x ∈ set` goes left.
    Levels(LevelSet),
}

/// A single cell of a covariate column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// Numeric value.
    Numeric(f64),
    /// Categorical level code.
    Code(usize),
}

impl Cell {
    /// Read row `row` of `column`.
    #[must_use]
    pub fn of(column: &Column, row: usize) -> Self {
        match column {
            Column::Numeric { values, .. } => Cell::Numeric(values[row]),
            Column::Categorical { codes, .. } => Cell::Code(codes[row]),
        }
    }
}

/// The left-branch predicate.
///
/// A cell whose type does not match the split point never goes left; schema
/// checks upstream keep that from happening.
#[must_use]
pub fn goes_left(cell: Cell, point: &SplitPoint) -> bool {
    match (point, cell) {
        (SplitPoint::Threshold(t), Cell::Numeric(x)) => x <= *t,
        (SplitPoint::Levels(set), Cell::Code(code)) => set.contains(code),
        _ => false,
    }
}

/// Partition `rows` of `column` by the left-branch predicate.
#[must_use]
pub fn partition_rows(column: &Column, rows: &[usize], point: &SplitPoint) -> (Vec<usize>, Vec<usize>) {
    rows.iter()
        .partition(|&&row| goes_left(Cell::of(column, row), point))
}

/// Response column as seen by split search and induction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Response<'a> {
    /// Class codes in `0..n_classes`.
    Classes { codes: &'a [usize], n_classes: usize },
    /// Regression responses.
    Values(&'a [f64]),
}

impl<'a> Response<'a> {
    pub(crate) fn from_column(column: &'a Column) -> Self {
        match column {
            Column::Categorical { levels, codes, .. } => Response::Classes {
                codes,
                n_classes: levels.len(),
            },
            Column::Numeric { values, .. } => Response::Values(values),
        }
    }

    /// Per-class counts over `rows` (empty for regression).
    pub(crate) fn class_counts(&self, rows: &[usize]) -> Vec<f64> {
        match self {
            Response::Classes { codes, n_classes } => {
                let mut counts = vec![0.0; *n_classes];
                for &row in rows {
                    counts[codes[row]] += 1.0;
                }
                counts
            }
            Response::Values(_) => Vec::new(),
        }
    }

    /// Response values over `rows` (empty for classification).
    pub(crate) fn values(&self, rows: &[usize]) -> Vec<f64> {
        match self {
            Response::Values(values) => rows.iter().map(|&r| values[r]).collect(),
            Response::Classes { .. } => Vec::new(),
        }
    }
}

/// Winning split of a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SplitCandidate {
    /// Zero-based covariate index.
    pub(crate) variable: usize,
    /// Split point on that covariate.
    pub(crate) point: SplitPoint,
    /// Summed side risks divided by the node's row count.
    pub(crate) score: f64,
}

/// Find the globally best split of `rows`.
///
/// When `max_covariates` is below the covariate count, that many covariates
/// are drawn without replacement and the search is restricted to them. Ties
/// go to the first covariate, then the first candidate. Returns `None` when
/// no covariate offers a candidate.
pub(crate) fn find_best_split(
    covariates: &[Column],
    response: Response<'_>,
    rows: &[usize],
    risk: &dyn RiskFunction,
    prior: &Prior,
    max_covariates: Option<usize>,
    rng: &mut impl Rng,
) -> Option<SplitCandidate> {
    let n_covariates = covariates.len();
    if rows.is_empty() || n_covariates == 0 {
        return None;
    }

    let selected: Vec<usize> = match max_covariates {
        Some(k) if k < n_covariates => {
            let mut picked = rand::seq::index::sample(rng, n_covariates, k).into_vec();
            picked.sort_unstable();
            picked
        }
        _ => (0..n_covariates).collect(),
    };

    let n = rows.len() as f64;
    let mut best: Option<SplitCandidate> = None;
    for variable in selected {
        let found = match &covariates[variable] {
            Column::Numeric { values, .. } => best_numeric(values, response, rows, risk, prior),
            Column::Categorical { codes, levels, .. } => {
                best_categorical(codes, levels.len(), response, rows, risk, prior)
            }
        };
        if let Some((point, total)) = found {
            let score = total / n;
            if best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(SplitCandidate {
                    variable,
                    point,
                    score,
                });
            }
        }
    }
    best
}

/// Scan midpoints between adjacent distinct values of a numeric covariate.
fn best_numeric(
    values: &[f64],
    response: Response<'_>,
    rows: &[usize],
    risk: &dyn RiskFunction,
    prior: &Prior,
) -> Option<(SplitPoint, f64)> {
    let mut sorted: Vec<usize> = rows.to_vec();
    sorted.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut best: Option<(f64, f64)> = None;
    let mut consider = |threshold: f64, total: f64| {
        if best.is_none_or(|(_, b)| total < b) {
            best = Some((threshold, total));
        }
    };

    match response {
        Response::Classes { codes, n_classes } => {
            let mut left = vec![0.0; n_classes];
            let mut right = response.class_counts(&sorted);
            for i in 0..sorted.len() - 1 {
                let class = codes[sorted[i]];
                left[class] += 1.0;
                right[class] -= 1.0;
                let (lo, hi) = (values[sorted[i]], values[sorted[i + 1]]);
                if lo == hi {
                    continue;
                }
                let total = risk
                    .risk(&[Labels::Counts(&left), Labels::Counts(&right)], prior, false)
                    .total();
                consider(midpoint(lo, hi), total);
            }
        }
        Response::Values(ys) => {
            let sorted_ys: Vec<f64> = sorted.iter().map(|&r| ys[r]).collect();
            for i in 0..sorted.len() - 1 {
                let (lo, hi) = (values[sorted[i]], values[sorted[i + 1]]);
                if lo == hi {
                    continue;
                }
                let (left, right) = sorted_ys.split_at(i + 1);
                let total = risk
                    .risk(&[Labels::Values(left), Labels::Values(right)], prior, false)
                    .total();
                consider(midpoint(lo, hi), total);
            }
        }
    }

    best.map(|(threshold, total)| (SplitPoint::Threshold(threshold), total))
}

/// Midpoint of `lo < hi` that still sends `hi` right under `x <= t`.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}

/// Enumerate level subsets of the levels observed among `rows`.
///
/// The last observed level always goes right, so every subset/complement pair
/// is visited once: `2^(L-1) - 1` candidates for `L` observed levels.
fn best_categorical(
    codes: &[usize],
    n_levels: usize,
    response: Response<'_>,
    rows: &[usize],
    risk: &dyn RiskFunction,
    prior: &Prior,
) -> Option<(SplitPoint, f64)> {
    let mut present = vec![false; n_levels];
    for &row in rows {
        present[codes[row]] = true;
    }
    let observed: Vec<usize> = (0..n_levels).filter(|&l| present[l]).collect();
    if observed.len() < 2 {
        return None;
    }
    let free = observed.len() - 1;

    let mut best: Option<(u64, f64)> = None;
    match response {
        Response::Classes { codes: classes, n_classes } => {
            let mut by_level = vec![vec![0.0; n_classes]; n_levels];
            for &row in rows {
                by_level[codes[row]][classes[row]] += 1.0;
            }
            let mut left = vec![0.0; n_classes];
            let mut right = vec![0.0; n_classes];
            for mask in 1..(1u64 << free) {
                left.iter_mut().for_each(|v| *v = 0.0);
                right.iter_mut().for_each(|v| *v = 0.0);
                for (bit, &level) in observed.iter().enumerate() {
                    let side = if bit < free && mask & (1 << bit) != 0 {
                        &mut left
                    } else {
                        &mut right
                    };
                    for (acc, &count) in side.iter_mut().zip(&by_level[level]) {
                        *acc += count;
                    }
                }
                let total = risk
                    .risk(&[Labels::Counts(&left), Labels::Counts(&right)], prior, false)
                    .total();
                if best.is_none_or(|(_, b)| total < b) {
                    best = Some((mask, total));
                }
            }
        }
        Response::Values(ys) => {
            let mut by_level: Vec<Vec<f64>> = vec![Vec::new(); n_levels];
            for &row in rows {
                by_level[codes[row]].push(ys[row]);
            }
            let mut left = Vec::with_capacity(rows.len());
            let mut right = Vec::with_capacity(rows.len());
            for mask in 1..(1u64 << free) {
                left.clear();
                right.clear();
                for (bit, &level) in observed.iter().enumerate() {
                    if bit < free && mask & (1 << bit) != 0 {
                        left.extend_from_slice(&by_level[level]);
                    } else {
                        right.extend_from_slice(&by_level[level]);
                    }
                }
                let total = risk
                    .risk(&[Labels::Values(&left), Labels::Values(&right)], prior, false)
                    .total();
                if best.is_none_or(|(_, b)| total < b) {
                    best = Some((mask, total));
                }
            }
        }
    }

    best.map(|(mask, total)| {
        let set = observed
            .iter()
            .take(free)
            .enumerate()
            .filter(|&(bit, _)| mask & (1 << bit) != 0)
            .map(|(_, &level)| level)
            .collect();
        (SplitPoint::Levels(LevelSet::new(set)), total)
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::risk::Criterion;

    fn classes(raw: &[&str]) -> Column {
        Column::categorical_from_strs("y", raw)
    }

    fn search(covariates: &[Column], y: &Column, max: Option<usize>) -> Option<SplitCandidate> {
        let response = Response::from_column(y);
        let rows: Vec<usize> = (0..y.len()).collect();
        let prior = Prior::empirical(response.class_counts(&rows));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        find_best_split(covariates, response, &rows, &Criterion::Gini, &prior, max, &mut rng)
    }

    #[test]
    fn numeric_split_at_midpoint() {
        let y = classes(&["A", "A", "B", "B"]);
        let x = Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0]);
        let split = search(&[x], &y, None).expect("should find a split");
        assert_eq!(split.variable, 0);
        assert_eq!(split.point, SplitPoint::Threshold(2.5));
        assert!(split.score.abs() < 1e-12);
    }

    #[test]
    fn categorical_two_vs_one_subset() {
        let y = classes(&["A", "A", "A", "B", "B"]);
        let c = Column::categorical_from_strs("c", &["x", "y", "x", "z", "z"]);
        let split = search(&[c], &y, None).expect("should find a split");
        assert_eq!(split.point, SplitPoint::Levels(LevelSet::new(vec![0, 1])));
        assert!(split.score.abs() < 1e-12);
    }

    #[test]
    fn subset_count_is_half_the_power_set() {
        // Four observed levels: 2^3 - 1 = 7 candidate subsets, none containing the last level.
        let y = classes(&["A", "B", "A", "B"]);
        let c = Column::categorical_from_strs("c", &["p", "q", "r", "s"]);
        let response = Response::from_column(&y);
        let rows: Vec<usize> = (0..4).collect();
        let prior = Prior::empirical(response.class_counts(&rows));
        let Column::Categorical { codes, levels, .. } = &c else {
            unreachable!()
        };
        let (point, _) =
            best_categorical(codes, levels.len(), response, &rows, &Criterion::Gini, &prior).unwrap();
        let SplitPoint::Levels(set) = point else {
            panic!("expected level set");
        };
        assert!(!set.contains(3));
        assert_eq!(set.codes(), &[0, 2]);
    }

    #[test]
    fn constant_covariates_yield_no_split() {
        let y = classes(&["A", "B", "A", "B"]);
        let x = Column::numeric("x", vec![5.0; 4]);
        let c = Column::categorical_from_strs("c", &["k", "k", "k", "k"]);
        assert!(search(&[x, c], &y, None).is_none());
    }

    #[test]
    fn ties_go_to_first_covariate() {
        let y = classes(&["A", "A", "B", "B"]);
        let x1 = Column::numeric("x1", vec![1.0, 2.0, 3.0, 4.0]);
        let x2 = Column::numeric("x2", vec![10.0, 20.0, 30.0, 40.0]);
        let split = search(&[x1, x2], &y, None).unwrap();
        assert_eq!(split.variable, 0);
    }

    #[test]
    fn subsampling_restricts_search() {
        let y = classes(&["A", "A", "B", "B"]);
        let noise = Column::numeric("noise", vec![3.0, 1.0, 4.0, 2.0]);
        let signal = Column::numeric("signal", vec![1.0, 2.0, 3.0, 4.0]);
        let covariates = [noise, signal];
        let response = Response::from_column(&y);
        let rows: Vec<usize> = (0..4).collect();
        let prior = Prior::empirical(response.class_counts(&rows));
        let mut seen = [false; 2];
        for seed in 0..32 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let split = find_best_split(&covariates, response, &rows, &Criterion::Gini, &prior, Some(1), &mut rng)
                .unwrap();
            seen[split.variable] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn regression_numeric_split() {
        let y = Column::numeric("y", vec![1.0, 1.2, 9.0, 9.4]);
        let x = Column::numeric("x", vec![0.0, 1.0, 2.0, 3.0]);
        let response = Response::from_column(&y);
        let rows: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let split = find_best_split(&[x], response, &rows, &Criterion::Sse, &Prior::none(), None, &mut rng)
            .unwrap();
        assert_eq!(split.point, SplitPoint::Threshold(1.5));
    }

    #[test]
    fn predicate_dispatches_on_split_type() {
        let t = SplitPoint::Threshold(2.5);
        assert!(goes_left(Cell::Numeric(2.5), &t));
        assert!(!goes_left(Cell::Numeric(2.6), &t));
        let s = SplitPoint::Levels(LevelSet::new(vec![2, 0]));
        assert!(goes_left(Cell::Code(0), &s));
        assert!(!goes_left(Cell::Code(1), &s));
        assert!(!goes_left(Cell::Code(0), &t));
    }

    #[test]
    fn partition_uses_predicate() {
        let x = Column::numeric("x", vec![1.0, 5.0, 2.0, 7.0]);
        let (left, right) = partition_rows(&x, &[0, 1, 2, 3], &SplitPoint::Threshold(3.0));
        assert_eq!(left, vec![0, 2]);
        assert_eq!(right, vec![1, 3]);
    }
}
