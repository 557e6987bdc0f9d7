//! Importance-guided masking of test series.
//!
//! A [`Masker`] ranks the observations of each series by importance and
//! overwrites the highest-ranked ones. Carry-forward methods (`end`, `std`,
//! `end_fit`) repeat the previous value from the selected step onwards;
//! substitution methods (`zero`, `mean`) overwrite single cells.
//!
//! Ranking is descending and ties are shuffled with a seeded RNG, so the
//! same importance map always produces the same masked series.

use std::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayViewMut1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use txai_core::TSShape;
use txai_explain::{Aggregation, Explanation, ImportanceMap};

/// Observations scored at or below this value are never masked.
pub const IMPORTANCE_THRESHOLD: f32 = -1000.0;

/// How selected observations are overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMethod {
    /// Carry the previous value to the end of the series.
    End,
    /// Carry the previous value until the series moves by more than one
    /// standard deviation.
    Std,
    /// Like `end`, with candidates starting at `t = 10`.
    EndFit,
    /// Set the cell to zero.
    Zero,
    /// Set the cell to the series mean of its feature.
    Mean,
}

impl MaskMethod {
    /// Name used in masker names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MaskMethod::End => "end",
            MaskMethod::Std => "std",
            MaskMethod::EndFit => "end_fit",
            MaskMethod::Zero => "zero",
            MaskMethod::Mean => "mean",
        }
    }

    /// First timestep that may be selected.
    #[must_use]
    pub const fn min_time(&self) -> usize {
        match self {
            MaskMethod::End | MaskMethod::Std => 1,
            MaskMethod::EndFit => 10,
            MaskMethod::Zero | MaskMethod::Mean => 0,
        }
    }

    /// True for methods that repeat the previous value.
    #[must_use]
    pub const fn is_carry_forward(&self) -> bool {
        matches!(self, MaskMethod::End | MaskMethod::Std | MaskMethod::EndFit)
    }
}

impl std::fmt::Display for MaskMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskMethod {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "end" => Ok(MaskMethod::End),
            "std" => Ok(MaskMethod::Std),
            "end_fit" => Ok(MaskMethod::EndFit),
            "zero" => Ok(MaskMethod::Zero),
            "mean" => Ok(MaskMethod::Mean),
            other => Err(EvalError::UnknownOption {
                what: "mask method",
                value: other.to_string(),
            }),
        }
    }
}

/// How many observations to select.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopK {
    /// `k` observations inside each series.
    Count(usize),
    /// A fraction of all observations across the test set.
    Fraction(f64),
}

impl TopK {
    /// True for per-series selection.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, TopK::Count(_))
    }
}

/// Whether selected cells are removed or kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionMode {
    /// Overwrite the selected cells.
    #[default]
    Remove,
    /// Overwrite everything except the selected cells.
    Keep,
}

impl FromStr for SubstitutionMode {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remove" => Ok(SubstitutionMode::Remove),
            "keep" => Ok(SubstitutionMode::Keep),
            other => Err(EvalError::UnknownOption {
                what: "substitution mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Which end of the ranking is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Most important first.
    #[default]
    Top,
    /// Least important first.
    Bottom,
}

impl FromStr for Direction {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Direction::Top),
            "bottom" => Ok(Direction::Bottom),
            other => Err(EvalError::UnknownOption {
                what: "direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Masker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskerConfig {
    /// Masking method.
    pub method: MaskMethod,
    /// Selection size.
    pub top: TopK,
    /// Stop once `k` cells of a series are masked in total.
    pub balanced: bool,
    /// Seed for tie shuffling.
    pub seed: u64,
    /// Rank by absolute importance.
    pub absolutize: bool,
    /// Aggregation of windowed scores.
    pub aggregation: Aggregation,
    /// Remove or keep the selection (substitution methods).
    pub mode: SubstitutionMode,
    /// Top or bottom of the ranking (substitution methods).
    pub direction: Direction,
}

impl MaskerConfig {
    /// Unbalanced masker with default seed and aggregation.
    pub fn new(method: MaskMethod, top: TopK) -> Self {
        Self {
            method,
            top,
            balanced: false,
            seed: 42,
            absolutize: false,
            aggregation: Aggregation::Mean,
            mode: SubstitutionMode::Remove,
            direction: Direction::Top,
        }
    }

    /// Set balanced masking.
    pub fn with_balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    /// Set the tie-shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Rank by absolute value.
    pub fn with_absolutize(mut self, absolutize: bool) -> Self {
        self.absolutize = absolutize;
        self
    }

    /// Set the aggregation of windowed scores.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the substitution mode.
    pub fn with_mode(mut self, mode: SubstitutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the ranking direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Masked series and bookkeeping of what was masked.
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// Masked input `(N, V, L)`.
    pub x: Array3<f32>,
    /// Cells overwritten `(N, V, L)`.
    pub masked: Array3<bool>,
    /// Cells where a masking run started `(N, V, L)`.
    pub started: Array3<bool>,
}

impl MaskOutcome {
    /// Runs started at each `(feature, time)`, summed over series.
    pub fn start_masked_count(&self) -> Array2<usize> {
        count_over_series(&self.started)
    }

    /// Cells masked at each `(feature, time)`, summed over series.
    pub fn all_masked_count(&self) -> Array2<usize> {
        count_over_series(&self.masked)
    }

    /// Number of features with at least one masked cell, per series.
    pub fn features_masked(&self) -> Array1<usize> {
        Array1::from_iter(self.masked.outer_iter().map(|series| {
            series
                .outer_iter()
                .filter(|row| row.iter().any(|m| *m))
                .count()
        }))
    }

    /// Masked cells per series.
    pub fn masked_per_series(&self) -> Array1<usize> {
        Array1::from_iter(
            self.masked
                .outer_iter()
                .map(|series| series.iter().filter(|m| **m).count()),
        )
    }

    /// Mean number of masked cells per series.
    pub fn avg_masked_count(&self) -> f64 {
        let per_series = self.masked_per_series();
        if per_series.is_empty() {
            return 0.0;
        }
        per_series.iter().sum::<usize>() as f64 / per_series.len() as f64
    }
}

fn count_over_series(flags: &Array3<bool>) -> Array2<usize> {
    flags
        .map(|m| usize::from(*m))
        .sum_axis(Axis(0))
}

struct SeriesMask {
    x: Array2<f32>,
    masked: Array2<bool>,
    started: Array2<bool>,
}

impl SeriesMask {
    fn new(x: ArrayView2<'_, f32>) -> Self {
        let dim = x.dim();
        Self {
            x: x.to_owned(),
            masked: Array2::from_elem(dim, false),
            started: Array2::from_elem(dim, false),
        }
    }

    /// Carry forward from `(f, t)`; returns the number of cells overwritten.
    fn carry(&mut self, f: usize, t: usize, method: MaskMethod) -> usize {
        let end = carry_forward(self.x.row_mut(f), t, method);
        self.masked.slice_mut(s![f, t..end]).fill(true);
        self.started[[f, t]] = true;
        end - t
    }
}

/// Repeat `row[t - 1]` from `t` on and return the exclusive end of the run.
fn carry_forward(mut row: ArrayViewMut1<'_, f32>, t: usize, method: MaskMethod) -> usize {
    debug_assert!(t > 0, "carry forward needs a previous value");
    let len = row.len();
    let end = match method {
        MaskMethod::Std => {
            let threshold = row.std(0.0);
            let old = row[t];
            (t..len)
                .find(|&k| (row[k] - old).abs() > threshold)
                .unwrap_or(len)
        }
        _ => len,
    };
    let previous = row[t - 1];
    row.slice_mut(s![t..end]).fill(previous);
    end
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
fn percentile(mut values: Vec<f32>, q: f64) -> f32 {
    if values.is_empty() {
        return f32::INFINITY;
    }
    values.sort_by(f32::total_cmp);
    let pos = (q / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    values[lo] + (values[hi] - values[lo]) * frac
}

/// Importance-guided masker.
#[derive(Debug, Clone)]
pub struct Masker {
    config: MaskerConfig,
}

impl Masker {
    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidMasker`] when the settings conflict:
    /// balanced masking outside local `std`/`end`, a zero count, a fraction
    /// outside `(0, 1]`, or remove/keep and direction options on a
    /// carry-forward method.
    pub fn new(config: MaskerConfig) -> Result<Self> {
        match config.top {
            TopK::Count(0) => {
                return Err(EvalError::InvalidMasker("top count must be positive".to_string()))
            }
            TopK::Fraction(p) if !(p > 0.0 && p <= 1.0) => {
                return Err(EvalError::InvalidMasker(format!(
                    "top fraction {p} is outside (0, 1]"
                )))
            }
            _ => {}
        }
        if config.balanced
            && !(config.top.is_local()
                && matches!(config.method, MaskMethod::Std | MaskMethod::End))
        {
            return Err(EvalError::InvalidMasker(
                "balanced masking needs a local top count with std or end".to_string(),
            ));
        }
        if config.method.is_carry_forward()
            && (config.mode != SubstitutionMode::Remove || config.direction != Direction::Top)
        {
            return Err(EvalError::InvalidMasker(format!(
                "{} masking only removes top-ranked observations",
                config.method
            )));
        }
        Ok(Self { config })
    }

    /// The configuration.
    pub fn config(&self) -> &MaskerConfig {
        &self.config
    }

    /// Name used in result rows, e.g. `top5_std_mean` or `globaltop20_end_max`.
    pub fn name(&self) -> String {
        let c = &self.config;
        let mut name = match c.top {
            TopK::Count(k) if c.balanced => format!("bal{k}_{}_{}", c.method, c.aggregation),
            TopK::Count(k) => format!("top{k}_{}_{}", c.method, c.aggregation),
            TopK::Fraction(p) => format!(
                "globaltop{}_{}_{}",
                (p * 100.0).round() as usize,
                c.method,
                c.aggregation
            ),
        };
        if c.mode == SubstitutionMode::Keep {
            name.push_str("_keep");
        }
        if c.direction == Direction::Bottom {
            name.push_str("_bottom");
        }
        name
    }

    /// Mask with the importance of an explanation, aggregated as configured.
    ///
    /// # Errors
    ///
    /// See [`Masker::mask`].
    pub fn mask_explanation(&self, x: &Array3<f32>, explanation: &Explanation) -> Result<MaskOutcome> {
        self.mask(x, &explanation.importance_for(self.config.aggregation))
    }

    /// Mask `x (N, V, L)` guided by `importance (N, L, V)`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidShape`] if the map does not match `x`.
    pub fn mask(&self, x: &Array3<f32>, importance: &ImportanceMap) -> Result<MaskOutcome> {
        let (n, n_vars, seq_len) = x.dim();
        importance
            .ensure_matches(TSShape::from(x.dim()))
            .map_err(|e| EvalError::InvalidShape(e.to_string()))?;

        let ranking = if self.config.absolutize {
            importance.values().mapv(f32::abs)
        } else {
            importance.ranking_scores()
        };
        let scores = ranking
            .permuted_axes([0, 2, 1])
            .as_standard_layout()
            .into_owned();

        let series = match (self.config.top, self.config.method) {
            (TopK::Count(k), _) => (0..n)
                .into_par_iter()
                .map(|i| {
                    self.mask_series(
                        i,
                        x.index_axis(Axis(0), i),
                        scores.index_axis(Axis(0), i),
                        k,
                    )
                })
                .collect(),
            (TopK::Fraction(p), MaskMethod::End | MaskMethod::Std) => {
                self.mask_global_carry(x, &scores, p)
            }
            (TopK::Fraction(p), MaskMethod::EndFit) => self.mask_global_end_fit(x, &scores, p),
            (TopK::Fraction(p), MaskMethod::Zero | MaskMethod::Mean) => {
                self.mask_global_cells(x, &scores, p)
            }
        };

        let outcome = assemble(series, (n, n_vars, seq_len));
        tracing::debug!(
            masker = %self.name(),
            avg_masked = outcome.avg_masked_count(),
            "masked test series"
        );
        Ok(outcome)
    }

    fn series_rng(&self, i: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(i as u64);
        rng
    }

    /// Order candidates by score (descending for top) and shuffle ties.
    fn rank<C: Copy>(&self, mut cells: Vec<C>, score: impl Fn(C) -> f32, rng: &mut ChaCha8Rng) -> Vec<C> {
        match self.config.direction {
            Direction::Top => cells.sort_by(|&a, &b| score(b).total_cmp(&score(a))),
            Direction::Bottom => cells.sort_by(|&a, &b| score(a).total_cmp(&score(b))),
        }
        let mut start = 0;
        while start < cells.len() {
            let value = score(cells[start]);
            let mut end = start + 1;
            while end < cells.len() && score(cells[end]) == value {
                end += 1;
            }
            if end - start > 1 {
                cells[start..end].shuffle(rng);
            }
            start = end;
        }
        cells
    }

    fn mask_series(
        &self,
        i: usize,
        x: ArrayView2<'_, f32>,
        scores: ArrayView2<'_, f32>,
        k: usize,
    ) -> SeriesMask {
        let (n_vars, seq_len) = x.dim();
        let method = self.config.method;
        let min_time = method.min_time();
        let mut out = SeriesMask::new(x);
        if seq_len <= min_time {
            return out;
        }
        let mut rng = self.series_rng(i);

        match method {
            MaskMethod::End | MaskMethod::Std => {
                let cells: Vec<(usize, usize)> = (0..n_vars)
                    .flat_map(|f| (min_time..seq_len).map(move |t| (f, t)))
                    .collect();
                let ranked = self.rank(cells, |(f, t)| scores[[f, t]], &mut rng);
                let (mut runs, mut total) = (0usize, 0usize);
                for (f, t) in ranked {
                    if scores[[f, t]] <= IMPORTANCE_THRESHOLD
                        || (self.config.balanced && total >= k)
                        || runs >= k
                    {
                        break;
                    }
                    if out.masked[[f, t]] {
                        continue;
                    }
                    total += out.carry(f, t, method);
                    runs += 1;
                }
            }
            MaskMethod::EndFit => {
                let mut working = scores.to_owned();
                for _ in 0..k {
                    let mut best = (0, min_time);
                    let mut best_value = f32::NEG_INFINITY;
                    for f in 0..n_vars {
                        for t in min_time..seq_len {
                            if working[[f, t]] > best_value {
                                best_value = working[[f, t]];
                                best = (f, t);
                            }
                        }
                    }
                    let (f, t) = best;
                    working.slice_mut(s![f, t..]).fill(-1.0);
                    out.carry(f, t, method);
                }
            }
            MaskMethod::Zero | MaskMethod::Mean => {
                let cells: Vec<(usize, usize)> = (0..n_vars)
                    .flat_map(|f| (0..seq_len).map(move |t| (f, t)))
                    .collect();
                let take = k.min(cells.len());
                let ranked = self.rank(cells, |(f, t)| scores[[f, t]], &mut rng);
                let mut selected = Array2::from_elem((n_vars, seq_len), false);
                for &(f, t) in ranked.iter().take(take) {
                    selected[[f, t]] = true;
                }
                self.substitute(&mut out, x, scores, &selected);
            }
        }
        out
    }

    /// Overwrite the cells picked by `selected` and the mode.
    fn substitute(
        &self,
        out: &mut SeriesMask,
        x: ArrayView2<'_, f32>,
        scores: ArrayView2<'_, f32>,
        selected: &Array2<bool>,
    ) {
        let means = x.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(x.nrows()));
        for ((f, t), &sel) in selected.indexed_iter() {
            let hit = match self.config.mode {
                SubstitutionMode::Remove => sel,
                SubstitutionMode::Keep => !sel,
            };
            if !hit || scores[[f, t]] <= IMPORTANCE_THRESHOLD {
                continue;
            }
            out.x[[f, t]] = match self.config.method {
                MaskMethod::Mean => means[f],
                _ => 0.0,
            };
            out.masked[[f, t]] = true;
            out.started[[f, t]] = true;
        }
    }

    fn mask_global_carry(&self, x: &Array3<f32>, scores: &Array3<f32>, p: f64) -> Vec<SeriesMask> {
        let (n, n_vars, seq_len) = x.dim();
        let min_time = self.config.method.min_time();
        let mut series: Vec<SeriesMask> = x.outer_iter().map(SeriesMask::new).collect();
        if seq_len <= min_time {
            return series;
        }
        let cells: Vec<(usize, usize, usize)> = (0..n)
            .flat_map(|i| (0..n_vars).flat_map(move |f| (min_time..seq_len).map(move |t| (i, f, t))))
            .collect();
        let n_drop = (cells.len() as f64 * p) as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let ranked = self.rank(cells, |(i, f, t)| scores[[i, f, t]], &mut rng);

        for (i, f, t) in ranked.into_iter().take(n_drop) {
            if scores[[i, f, t]] <= IMPORTANCE_THRESHOLD {
                break;
            }
            if series[i].masked[[f, t]] {
                continue;
            }
            series[i].carry(f, t, self.config.method);
        }
        series
    }

    fn mask_global_end_fit(&self, x: &Array3<f32>, scores: &Array3<f32>, p: f64) -> Vec<SeriesMask> {
        let (_, n_vars, seq_len) = x.dim();
        let min_time = self.config.method.min_time();
        let mut series: Vec<SeriesMask> = x.outer_iter().map(SeriesMask::new).collect();
        if seq_len <= min_time {
            return series;
        }
        let candidates = scores.slice(s![.., .., min_time..]).iter().copied().collect();
        let q = percentile(candidates, 100.0 - p * 100.0);

        series.par_iter_mut().enumerate().for_each(|(i, out)| {
            for f in 0..n_vars {
                let t = (min_time..seq_len)
                    .find(|&t| scores[[i, f, t]] >= q)
                    .unwrap_or(seq_len - 1);
                out.carry(f, t, MaskMethod::EndFit);
            }
        });
        series
    }

    fn mask_global_cells(&self, x: &Array3<f32>, scores: &Array3<f32>, p: f64) -> Vec<SeriesMask> {
        let (n, n_vars, seq_len) = x.dim();
        let cells: Vec<(usize, usize, usize)> = (0..n)
            .flat_map(|i| (0..n_vars).flat_map(move |f| (0..seq_len).map(move |t| (i, f, t))))
            .collect();
        let take = ((cells.len() as f64 * p).round() as usize).clamp(1, cells.len().max(1));
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let ranked = self.rank(cells, |(i, f, t)| scores[[i, f, t]], &mut rng);

        let mut selected = Array3::from_elem((n, n_vars, seq_len), false);
        for &(i, f, t) in ranked.iter().take(take) {
            selected[[i, f, t]] = true;
        }
        (0..n)
            .map(|i| {
                let xi = x.index_axis(Axis(0), i);
                let mut out = SeriesMask::new(xi);
                self.substitute(
                    &mut out,
                    xi,
                    scores.index_axis(Axis(0), i),
                    &selected.index_axis(Axis(0), i).to_owned(),
                );
                out
            })
            .collect()
    }
}

fn assemble(series: Vec<SeriesMask>, dim: (usize, usize, usize)) -> MaskOutcome {
    let mut outcome = MaskOutcome {
        x: Array3::zeros(dim),
        masked: Array3::from_elem(dim, false),
        started: Array3::from_elem(dim, false),
    };
    for (i, s) in series.into_iter().enumerate() {
        outcome.x.index_axis_mut(Axis(0), i).assign(&s.x);
        outcome.masked.index_axis_mut(Axis(0), i).assign(&s.masked);
        outcome.started.index_axis_mut(Axis(0), i).assign(&s.started);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Importance `(N, L, V)` from a `(N, V, L)` layout.
    fn importance(values: Array3<f32>) -> ImportanceMap {
        ImportanceMap::new(values.permuted_axes([0, 2, 1]).as_standard_layout().into_owned())
    }

    fn masker(method: MaskMethod, top: TopK) -> Masker {
        Masker::new(MaskerConfig::new(method, top)).unwrap()
    }

    #[test]
    fn test_end_carries_to_the_end() {
        let x = array![[[1.0, 2.0, 3.0, 4.0, 5.0], [10.0, 20.0, 30.0, 40.0, 50.0]]];
        let imp = importance(array![[[0.0, 0.1, 0.9, 0.2, 0.3], [0.0, 0.4, 0.1, 0.1, 0.1]]]);
        let out = masker(MaskMethod::End, TopK::Count(1)).mask(&x, &imp).unwrap();
        assert_eq!(out.x.slice(s![0, 0, ..]).to_vec(), vec![1.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(out.x.slice(s![0, 1, ..]), x.slice(s![0, 1, ..]));
        assert_eq!(out.masked_per_series()[0], 3);
        assert_eq!(out.start_masked_count()[[0, 2]], 1);
        assert_eq!(out.features_masked()[0], 1);
    }

    #[test]
    fn test_std_stops_at_large_move() {
        let mut row = array![0.0, 0.0, 0.0, 0.1, 5.0, 5.0];
        let end = carry_forward(row.view_mut(), 2, MaskMethod::Std);
        assert_eq!(end, 4);
        assert_eq!(row.to_vec(), vec![0.0, 0.0, 0.0, 0.0, 5.0, 5.0]);
    }

    #[test]
    fn test_time_zero_is_never_carried() {
        let x = Array3::from_shape_fn((1, 1, 4), |(_, _, t)| t as f32);
        let imp = importance(array![[[100.0, 1.0, 1.0, 1.0]]]);
        let out = masker(MaskMethod::End, TopK::Count(1)).mask(&x, &imp).unwrap();
        assert!(!out.masked[[0, 0, 0]]);
        assert!(out.masked[[0, 0, 1]] || out.masked[[0, 0, 2]] || out.masked[[0, 0, 3]]);
    }

    fn cfg_named() -> MaskerConfig {
        MaskerConfig::new(MaskMethod::End, TopK::Count(3)).with_balanced(true)
    }

    #[test]
    fn test_balanced_stops_at_cell_budget() {
        let x = Array3::from_shape_fn((1, 3, 6), |(_, f, t)| (f * 10 + t) as f32);
        let imp = importance(Array3::from_shape_fn((1, 3, 6), |(_, f, t)| {
            if t == 1 { 10.0 - f as f32 } else { 0.0 }
        }));
        let out = Masker::new(cfg_named()).unwrap().mask(&x, &imp).unwrap();
        // the first run already masks 5 cells >= 3
        assert_eq!(out.masked_per_series()[0], 5);
        assert_eq!(Masker::new(cfg_named()).unwrap().name(), "bal3_end_mean");
    }

    #[test]
    fn test_threshold_blocks_masking() {
        let x = Array3::ones((1, 1, 4));
        let imp = importance(Array3::from_elem((1, 1, 4), -2000.0));
        let out = masker(MaskMethod::End, TopK::Count(2)).mask(&x, &imp).unwrap();
        assert_eq!(out.avg_masked_count(), 0.0);
    }

    #[test]
    fn test_ties_are_seeded() {
        let x = Array3::from_shape_fn((4, 3, 8), |(i, f, t)| (i + f * t) as f32);
        let imp = importance(Array3::ones((4, 3, 8)));
        let run = |seed| {
            Masker::new(MaskerConfig::new(MaskMethod::End, TopK::Count(2)).with_seed(seed))
                .unwrap()
                .mask(&x, &imp)
                .unwrap()
                .masked
        };
        assert_eq!(run(1), run(1));
        let differs = (2..10).any(|seed| run(seed) != run(1));
        assert!(differs);
    }

    #[test]
    fn test_global_fraction() {
        let x = Array3::from_shape_fn((2, 2, 6), |(i, f, t)| (i * 100 + f * 10 + t) as f32);
        let imp = importance(Array3::from_shape_fn((2, 2, 6), |(i, f, t)| {
            if i == 1 && f == 0 && t == 5 { 1.0 } else { 0.0 }
        }));
        // 20 candidates, 5% -> a single run
        let m = masker(MaskMethod::End, TopK::Fraction(0.05));
        assert_eq!(m.name(), "globaltop5_end_mean");
        let out = m.mask(&x, &imp).unwrap();
        assert_eq!(out.masked_per_series().to_vec(), vec![0, 1]);
        assert_eq!(out.x[[1, 0, 5]], 104.0);
    }

    #[test]
    fn test_end_fit_starts_at_ten() {
        let x = Array3::from_shape_fn((1, 2, 14), |(_, f, t)| (f * 100 + t) as f32);
        let imp = importance(Array3::from_shape_fn((1, 2, 14), |(_, f, t)| {
            if f == 1 && t == 3 { 9.0 } else if f == 0 && t == 12 { 5.0 } else { -1.0 }
        }));
        let out = masker(MaskMethod::EndFit, TopK::Count(1)).mask(&x, &imp).unwrap();
        assert!(out.started[[0, 0, 12]]);
        assert_eq!(out.x[[0, 0, 13]], 11.0);
        assert_eq!(out.masked_per_series()[0], 2);

        let global = masker(MaskMethod::EndFit, TopK::Fraction(0.1)).mask(&x, &imp).unwrap();
        assert!(global.started[[0, 0, 12]]);
        // nothing above the percentile for feature 1: only the last step
        assert!(global.started[[0, 1, 13]]);
    }

    #[test]
    fn test_cell_substitution_modes() {
        let x = array![[[1.0, 2.0, 3.0, 6.0]]];
        let imp = importance(array![[[0.1, 0.9, 0.5, 0.2]]]);

        let zero = masker(MaskMethod::Zero, TopK::Count(2)).mask(&x, &imp).unwrap();
        assert_eq!(zero.x.iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0, 6.0]);

        let keep = Masker::new(
            MaskerConfig::new(MaskMethod::Mean, TopK::Count(1)).with_mode(SubstitutionMode::Keep),
        )
        .unwrap();
        assert_eq!(keep.name(), "top1_mean_mean_keep");
        let kept = keep.mask(&x, &imp).unwrap();
        assert_eq!(kept.x.iter().copied().collect::<Vec<_>>(), vec![3.0, 2.0, 3.0, 3.0]);

        let bottom = Masker::new(
            MaskerConfig::new(MaskMethod::Zero, TopK::Count(1)).with_direction(Direction::Bottom),
        )
        .unwrap()
        .mask(&x, &imp)
        .unwrap();
        assert!(bottom.masked[[0, 0, 0]]);
        assert_eq!(bottom.avg_masked_count(), 1.0);
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(Masker::new(MaskerConfig::new(MaskMethod::End, TopK::Fraction(0.1)).with_balanced(true)).is_err());
        assert!(Masker::new(MaskerConfig::new(MaskMethod::Zero, TopK::Count(2)).with_balanced(true)).is_err());
        assert!(Masker::new(MaskerConfig::new(MaskMethod::Std, TopK::Count(2)).with_mode(SubstitutionMode::Keep)).is_err());
        assert!(Masker::new(MaskerConfig::new(MaskMethod::End, TopK::Count(0))).is_err());
        assert!(Masker::new(MaskerConfig::new(MaskMethod::End, TopK::Fraction(1.5))).is_err());
        assert!("cells".parse::<MaskMethod>().is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let x = Array3::zeros((1, 2, 4));
        let imp = ImportanceMap::new(Array3::zeros((1, 2, 4)));
        assert!(masker(MaskMethod::End, TopK::Count(1)).mask(&x, &imp).is_err());
    }
}
