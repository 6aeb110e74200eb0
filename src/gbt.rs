use anyhow::{Result, bail};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::frame::{ColumnKind, Frame, SchemaError};
use crate::training::{BinaryClassifier, CategoricalEncoder, EncodedMatrix};

const MISSING_BIN: u32 = u32::MAX;
const MIN_GAIN: f64 = 1e-12;
const PROB_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub lambda: f64,
    pub min_child_weight: f64,
    pub max_bin: usize,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_depth: 3,
            learning_rate: 0.3,
            lambda: 1.0,
            min_child_weight: 1.0,
            max_bin: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitRule {
    /// Left when the value is `<=` the threshold.
    Threshold(f64),
    /// Left when the category code is in the (sorted) set.
    Categories(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        rule: SplitRule,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, x: &EncodedMatrix, row: usize) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    rule,
                    left,
                    right,
                } => {
                    let v = x.values[*feature][row];
                    idx = if goes_left(rule, v) { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

fn goes_left(rule: &SplitRule, v: f64) -> bool {
    if v.is_nan() {
        return false;
    }
    match rule {
        SplitRule::Threshold(t) => v <= *t,
        SplitRule::Categories(set) => set.binary_search(&(v as u32)).is_ok(),
    }
}

/// Additive ensemble of regression trees on the logit scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    base_margin: f64,
    trees: Vec<Tree>,
}

impl Booster {
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn predict_margin(&self, x: &EncodedMatrix) -> Vec<f64> {
        (0..x.n_rows)
            .map(|row| {
                self.base_margin + self.trees.iter().map(|t| t.predict_row(x, row)).sum::<f64>()
            })
            .collect()
    }

    pub fn predict_probability(&self, x: &EncodedMatrix) -> Vec<f64> {
        self.predict_margin(x).into_iter().map(sigmoid).collect()
    }

    /// Newton boosting on logistic loss.
    pub fn train(x: &EncodedMatrix, y: &[bool], params: &GbtParams) -> Self {
        let n = y.len();
        let positives = y.iter().filter(|v| **v).count();
        let base = (positives as f64 / n.max(1) as f64).clamp(PROB_EPS, 1.0 - PROB_EPS);
        let base_margin = (base / (1.0 - base)).ln();

        let binned = BinnedMatrix::build(x, params.max_bin);
        let mut margin = vec![base_margin; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let all_rows: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(n);
            let mut hess = Vec::with_capacity(n);
            for (m, target) in margin.iter().zip(y) {
                let p = sigmoid(*m);
                grad.push(p - if *target { 1.0 } else { 0.0 });
                hess.push((p * (1.0 - p)).max(1e-16));
            }

            let mut builder = TreeBuilder {
                binned: &binned,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            };
            builder.grow(all_rows.clone(), 0);
            let tree = Tree {
                nodes: builder.nodes,
            };
            for (row, m) in margin.iter_mut().enumerate() {
                *m += tree.predict_row(x, row);
            }
            trees.push(tree);
        }

        Self { base_margin, trees }
    }
}

fn sigmoid(m: f64) -> f64 {
    1.0 / (1.0 + (-m).exp())
}

/// Histogram bin per cell. Numeric bins are indexed by quantile cut points
/// (bin `b` holds values in `(cut[b-1], cut[b]]`); categorical bins are the
/// category codes.
struct BinnedMatrix {
    kinds: Vec<ColumnKind>,
    n_bins: Vec<usize>,
    cuts: Vec<Vec<f64>>,
    bins: Vec<Vec<u32>>,
}

impl BinnedMatrix {
    fn build(x: &EncodedMatrix, max_bin: usize) -> Self {
        let mut n_bins = Vec::with_capacity(x.n_cols());
        let mut cuts = Vec::with_capacity(x.n_cols());
        let mut bins = Vec::with_capacity(x.n_cols());

        for (col, kind) in x.values.iter().zip(&x.kinds) {
            match kind {
                ColumnKind::Numeric => {
                    let c = quantile_cuts(col, max_bin.max(2));
                    let b = col
                        .iter()
                        .map(|v| {
                            if v.is_nan() {
                                MISSING_BIN
                            } else {
                                c.partition_point(|cut| cut < v).min(c.len() - 1) as u32
                            }
                        })
                        .collect();
                    n_bins.push(c.len());
                    cuts.push(c);
                    bins.push(b);
                }
                ColumnKind::Categorical => {
                    let b = col
                        .iter()
                        .map(|v| if v.is_nan() { MISSING_BIN } else { *v as u32 })
                        .collect();
                    let card = col
                        .iter()
                        .filter(|v| !v.is_nan())
                        .map(|v| *v as usize + 1)
                        .max()
                        .unwrap_or(0);
                    n_bins.push(card);
                    cuts.push(Vec::new());
                    bins.push(b);
                }
            }
        }

        Self {
            kinds: x.kinds.clone(),
            n_bins,
            cuts,
            bins,
        }
    }
}

fn quantile_cuts(col: &[f64], max_bin: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut uniques = sorted.clone();
    uniques.dedup();
    if uniques.len() <= max_bin {
        return uniques;
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = (1..=max_bin)
        .map(|k| sorted[(k * n).div_ceil(max_bin).saturating_sub(1).min(n - 1)])
        .collect();
    cuts.dedup();
    cuts
}

#[derive(Debug, Clone)]
struct Candidate {
    feature: usize,
    gain: f64,
    rule: SplitRule,
    left_bins: LeftBins,
}

#[derive(Debug, Clone)]
enum LeftBins {
    UpTo(u32),
    Set(Vec<u32>),
}

struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbtParams,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = self.sums(&rows);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return id;
        }
        let Some(best) = self.best_split(&rows, g, h) else {
            return id;
        };

        let bins = &self.binned.bins[best.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| match &best.left_bins {
                LeftBins::UpTo(b) => bins[r] != MISSING_BIN && bins[r] <= *b,
                LeftBins::Set(set) => bins[r] != MISSING_BIN && set.binary_search(&bins[r]).is_ok(),
            });

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            rule: best.rule,
            left,
            right,
        };
        id
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]))
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    /// Best split over all features. Features are searched in parallel; the
    /// winner is the highest gain, ties going to the lowest column index.
    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let parent = self.score(g, h);
        let candidates: Vec<Option<Candidate>> = (0..self.binned.kinds.len())
            .into_par_iter()
            .map(|f| self.best_split_for(f, rows, g, h, parent))
            .collect();

        let mut best: Option<Candidate> = None;
        for c in candidates.into_iter().flatten() {
            if best.as_ref().is_none_or(|b| c.gain > b.gain) {
                best = Some(c);
            }
        }
        best
    }

    fn best_split_for(
        &self,
        feature: usize,
        rows: &[usize],
        g: f64,
        h: f64,
        parent: f64,
    ) -> Option<Candidate> {
        let n_bins = self.binned.n_bins[feature];
        if n_bins < 2 {
            return None;
        }
        let bins = &self.binned.bins[feature];
        let mut hist = vec![(0.0_f64, 0.0_f64); n_bins];
        for &r in rows {
            let b = bins[r];
            if b != MISSING_BIN && (b as usize) < n_bins {
                hist[b as usize].0 += self.grad[r];
                hist[b as usize].1 += self.hess[r];
            }
        }

        match self.binned.kinds[feature] {
            ColumnKind::Numeric => self.scan_numeric(feature, &hist, g, h, parent),
            ColumnKind::Categorical => self.scan_categorical(feature, &hist, g, h, parent),
        }
    }

    fn gain(&self, gl: f64, hl: f64, g: f64, h: f64, parent: f64) -> Option<f64> {
        let (gr, hr) = (g - gl, h - hl);
        if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
            return None;
        }
        let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent);
        (gain > MIN_GAIN).then_some(gain)
    }

    fn scan_numeric(
        &self,
        feature: usize,
        hist: &[(f64, f64)],
        g: f64,
        h: f64,
        parent: f64,
    ) -> Option<Candidate> {
        let mut best: Option<(f64, usize)> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for (b, (bg, bh)) in hist.iter().enumerate().take(hist.len() - 1) {
            gl += bg;
            hl += bh;
            if let Some(gain) = self.gain(gl, hl, g, h, parent)
                && best.is_none_or(|(best_gain, _)| gain > best_gain)
            {
                best = Some((gain, b));
            }
        }
        best.map(|(gain, b)| Candidate {
            feature,
            gain,
            rule: SplitRule::Threshold(self.binned.cuts[feature][b]),
            left_bins: LeftBins::UpTo(b as u32),
        })
    }

    /// Partition split: order present categories by their optimal leaf
    /// weight and take the best prefix as the left set.
    fn scan_categorical(
        &self,
        feature: usize,
        hist: &[(f64, f64)],
        g: f64,
        h: f64,
        parent: f64,
    ) -> Option<Candidate> {
        let lambda = self.params.lambda;
        let mut present: Vec<u32> = (0..hist.len() as u32)
            .filter(|&c| hist[c as usize].1 > 0.0)
            .collect();
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|&a, &b| {
            let wa = hist[a as usize].0 / (hist[a as usize].1 + lambda);
            let wb = hist[b as usize].0 / (hist[b as usize].1 + lambda);
            wa.total_cmp(&wb).then(a.cmp(&b))
        });

        let mut best: Option<(f64, usize)> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for (k, &code) in present.iter().enumerate().take(present.len() - 1) {
            gl += hist[code as usize].0;
            hl += hist[code as usize].1;
            if let Some(gain) = self.gain(gl, hl, g, h, parent)
                && best.is_none_or(|(best_gain, _)| gain > best_gain)
            {
                best = Some((gain, k));
            }
        }
        best.map(|(gain, k)| {
            let mut set = present[..=k].to_vec();
            set.sort_unstable();
            Candidate {
                feature,
                gain,
                rule: SplitRule::Categories(set.clone()),
                left_bins: LeftBins::Set(set),
            }
        })
    }
}

/// Gradient-boosted trees over a frame, with the categorical coercion it
/// was trained with carried alongside the ensemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub params: GbtParams,
    encoder: Option<CategoricalEncoder>,
    booster: Option<Booster>,
}

impl GradientBoostedTrees {
    pub fn new(params: GbtParams) -> Self {
        Self {
            params,
            encoder: None,
            booster: None,
        }
    }

    pub fn booster(&self) -> Option<&Booster> {
        self.booster.as_ref()
    }
}

impl BinaryClassifier for GradientBoostedTrees {
    fn fit(&mut self, x: &Frame, y: &[bool]) -> Result<()> {
        if x.n_rows() != y.len() {
            return Err(SchemaError::RowCount {
                context: "classifier fit".to_string(),
                left: x.n_rows(),
                right: y.len(),
            }
            .into());
        }
        if y.is_empty() {
            bail!("cannot fit a classifier on an empty table");
        }
        let encoder = CategoricalEncoder::fit(x);
        let matrix = encoder.transform(x)?;
        self.booster = Some(Booster::train(&matrix, y, &self.params));
        self.encoder = Some(encoder);
        Ok(())
    }

    fn predict_probability(&self, x: &Frame) -> Result<Vec<f64>> {
        let (Some(encoder), Some(booster)) = (&self.encoder, &self.booster) else {
            bail!("classifier used before fit");
        };
        let matrix = encoder.transform(x)?;
        Ok(booster.predict_probability(&matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Cell, ColumnSpec};

    fn toy() -> (Frame, Vec<bool>) {
        let mut x = Frame::new(vec![
            ColumnSpec::categorical("actiontype_a0"),
            ColumnSpec::numeric("start_x_a0"),
        ]);
        let mut y = Vec::new();
        for i in 0..200 {
            let kind = if i % 4 == 0 { "shot" } else { "other" };
            let start_x = (i % 100) as f64;
            x.push_row(vec![Cell::Cat(kind.into()), Cell::Num(start_x)]);
            y.push(kind == "shot" && start_x > 50.0);
        }
        (x, y)
    }

    #[test]
    fn learns_an_interaction_between_category_and_location() {
        let (x, y) = toy();
        let mut model = GradientBoostedTrees::new(GbtParams::default());
        model.fit(&x, &y).unwrap();
        let p = model.predict_probability(&x).unwrap();
        for (prob, target) in p.iter().zip(&y) {
            if *target {
                assert!(*prob > 0.8, "positive scored {prob}");
            } else {
                assert!(*prob < 0.2, "negative scored {prob}");
            }
        }
        let booster = model.booster().unwrap();
        assert_eq!(booster.trees().len(), 50);
        assert!(booster.trees().iter().all(|t| t.n_leaves() <= 1 << 3));
    }

    #[test]
    fn unseen_category_and_missing_route_right_without_error() {
        let (x, y) = toy();
        let mut model = GradientBoostedTrees::new(GbtParams::default());
        model.fit(&x, &y).unwrap();

        let mut unseen = Frame::new(x.columns.clone());
        unseen.push_row(vec![Cell::Cat("carry".into()), Cell::Num(80.0)]);
        unseen.push_row(vec![Cell::Missing, Cell::Missing]);
        let p = model.predict_probability(&unseen).unwrap();
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn single_class_fits_to_base_rate() {
        let (x, _) = toy();
        let y = vec![false; x.n_rows()];
        let mut model = GradientBoostedTrees::new(GbtParams::default());
        model.fit(&x, &y).unwrap();
        let p = model.predict_probability(&x).unwrap();
        assert!(p.iter().all(|v| *v < 0.01));
    }

    #[test]
    fn predict_before_fit_fails() {
        let (x, _) = toy();
        assert!(GradientBoostedTrees::default().predict_probability(&x).is_err());
    }

    #[test]
    fn cuts_are_bounded_and_sorted() {
        let col: Vec<f64> = (0..1000).map(|v| v as f64).collect();
        let cuts = quantile_cuts(&col, 16);
        assert!(cuts.len() <= 16);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(cuts.last().copied(), Some(999.0));
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = toy();
        let mut a = GradientBoostedTrees::new(GbtParams::default());
        let mut b = GradientBoostedTrees::new(GbtParams::default());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }
}
