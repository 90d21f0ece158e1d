//! A single online-learned linear power model (spec.md §4.3).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::error::ModelNotInitialized;

/// A performance-counter feature vector: event name to raw count.
pub type Features = HashMap<String, u64>;

/// One (features, label) sample kept in a model's training history.
type Sample = (Features, f64);

/// A linear regression `power = intercept + Σ coefficient[i] * feature[i]`,
/// fitted in closed form over a bounded FIFO history of labelled samples.
pub struct PowerModel {
    history: VecDeque<Sample>,
    window_size: usize,
    min_samples: usize,
    coefficients: BTreeMap<String, f64>,
    intercept: f64,
    fitted: bool,
    hash: u64,
}

impl PowerModel {
    pub fn new(window_size: usize, min_samples: usize) -> Self {
        PowerModel {
            history: VecDeque::new(),
            window_size,
            min_samples,
            coefficients: BTreeMap::new(),
            intercept: 0.0,
            fitted: false,
            hash: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// A stable digest of the fitted parameters, used as `formula_id` in
    /// emitted reports. Recomputed after every successful [`fit`](Self::fit).
    pub fn formula_id(&self) -> String {
        format!("{:016x}", self.hash)
    }

    /// `intercept + Σ coefficient[i] * features[i]`, treating any feature
    /// name absent from `features` (or from the fitted coefficients) as
    /// zero. Fails with [`ModelNotInitialized`] before the first fit.
    pub fn predict(&self, features: &Features) -> Result<f64, ModelNotInitialized> {
        if !self.fitted {
            return Err(ModelNotInitialized);
        }
        let mut value = self.intercept;
        for (name, coefficient) in &self.coefficients {
            let x = features.get(name).copied().unwrap_or(0) as f64;
            value += coefficient * x;
        }
        Ok(value)
    }

    /// The apportionment rule (spec.md Glossary): a target's share of the
    /// socket's estimated power equals its share of the `activity_counters`
    /// in the Core feature space. `global_core` and `target_core` must both
    /// be decoded for the same socket and tick.
    ///
    /// Sums to the whole-system estimate (P8) whenever the targets given to
    /// the caller partition `global_core`'s activity counters.
    pub fn predict_with(
        &self,
        global_core: &Features,
        target_core: &Features,
        activity_counters: &[String],
    ) -> Result<f64, ModelNotInitialized> {
        let system_power = self.predict(global_core)?;
        let target_sum: u64 = activity_counters
            .iter()
            .map(|counter| target_core.get(counter).copied().unwrap_or(0))
            .sum();
        let global_sum: u64 = activity_counters
            .iter()
            .map(|counter| global_core.get(counter).copied().unwrap_or(0))
            .sum();
        if global_sum == 0 {
            return Ok(0.0);
        }
        Ok(system_power * (target_sum as f64 / global_sum as f64))
    }

    /// Appends `(features, label)` to the bounded history, dropping the
    /// oldest sample once `window_size` is exceeded.
    pub fn record(&mut self, features: Features, label: f64) {
        self.history.push_back((features, label));
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }
    }

    /// Refits the model by ordinary least squares over the current history,
    /// if it holds at least `min_samples`. Leaves the model unchanged
    /// otherwise (spec.md §4.3).
    pub fn fit(&mut self) {
        if self.history.len() < self.min_samples {
            return;
        }

        let mut feature_names: Vec<String> = self
            .history
            .iter()
            .flat_map(|(features, _)| features.keys().cloned())
            .collect();
        feature_names.sort();
        feature_names.dedup();

        let (coefficients, intercept) = ordinary_least_squares(&self.history, &feature_names);
        self.coefficients = feature_names.into_iter().zip(coefficients).collect();
        self.intercept = intercept;
        self.fitted = true;
        self.hash = self.compute_hash();
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.intercept.to_bits().hash(&mut hasher);
        for (name, coefficient) in &self.coefficients {
            name.hash(&mut hasher);
            coefficient.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Solves `y = X*beta` in the least-squares sense via the normal equations
/// `(X^T X) beta = X^T y`, with an intercept column prepended to `X`.
///
/// There is no linear-algebra dependency in this workspace's stack, and the
/// design matrix here is tiny (a handful of Core counters, at most
/// `window_size` rows), so a hand-rolled Gauss-Jordan solve is both enough
/// and in keeping with how this codebase's formulas are otherwise plain
/// arithmetic (see `hwpc_power::model::frequency_layer_key`).
fn ordinary_least_squares(history: &VecDeque<Sample>, feature_names: &[String]) -> (Vec<f64>, f64) {
    let k = feature_names.len() + 1; // +1 for the intercept column
    let n = history.len();

    // Build X^T X (k x k) and X^T y (k) directly, without materializing X.
    let mut xtx = vec![vec![0.0_f64; k]; k];
    let mut xty = vec![0.0_f64; k];

    let row_of = |features: &Features| -> Vec<f64> {
        let mut row = Vec::with_capacity(k);
        row.push(1.0); // intercept
        for name in feature_names {
            row.push(features.get(name).copied().unwrap_or(0) as f64);
        }
        row
    };

    for (features, label) in history {
        let row = row_of(features);
        for i in 0..k {
            xty[i] += row[i] * label;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    // Ridge-stabilize the diagonal: with few samples or collinear counters,
    // X^T X can be singular. A tiny epsilon keeps Gauss-Jordan from dividing
    // by zero without materially changing a well-conditioned fit.
    let epsilon = 1e-6;
    for i in 0..k {
        xtx[i][i] += epsilon;
    }

    let beta = solve_linear_system(xtx, xty).unwrap_or_else(|| vec![0.0; k]);
    let _ = n;
    (beta[1..].to_vec(), beta[0])
}

/// Gauss-Jordan elimination with partial pivoting. Returns `None` if the
/// matrix is (numerically) singular even after ridge-stabilization.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        // Partial pivot: swap in the row with the largest |a[row][col]|.
        let pivot_row = (col..n).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
        }
        b[col] /= pivot;

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }
    Some(b)
}
