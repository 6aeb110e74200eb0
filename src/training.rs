use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::{Metrics, calibration_bins, evaluate_binary};
use crate::features::categorical_columns;
use crate::frame::{Cell, ColumnKind, ColumnSpec, Frame, SchemaError};
use crate::labels::{CONCEDES, SCORES};

/// Capability the trainer and the value attributor need from a model.
pub trait BinaryClassifier {
    fn fit(&mut self, x: &Frame, y: &[bool]) -> Result<()>;
    fn predict_probability(&self, x: &Frame) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelColumn {
    Scores,
    Concedes,
}

impl LabelColumn {
    pub const ALL: [LabelColumn; 2] = [LabelColumn::Scores, LabelColumn::Concedes];

    pub fn name(self) -> &'static str {
        match self {
            LabelColumn::Scores => SCORES,
            LabelColumn::Concedes => CONCEDES,
        }
    }
}

/// Per-column category vocabulary fixed at training time. Inference goes
/// through the same encoder so codes line up; unseen values become missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    columns: Vec<ColumnSpec>,
    vocab: Vec<Vec<String>>,
}

/// Column-major numeric view of a frame. Categorical cells hold their
/// vocabulary code; missing or unseen cells hold NaN.
#[derive(Debug, Clone)]
pub struct EncodedMatrix {
    pub n_rows: usize,
    pub kinds: Vec<ColumnKind>,
    pub cardinality: Vec<usize>,
    pub values: Vec<Vec<f64>>,
}

impl EncodedMatrix {
    pub fn n_cols(&self) -> usize {
        self.values.len()
    }
}

impl CategoricalEncoder {
    pub fn fit(x: &Frame) -> Self {
        let vocab = x
            .columns
            .iter()
            .enumerate()
            .map(|(idx, spec)| match spec.kind {
                ColumnKind::Numeric => Vec::new(),
                ColumnKind::Categorical => x
                    .rows
                    .iter()
                    .filter_map(|row| row[idx].as_category())
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            })
            .collect();
        Self {
            columns: x.columns.clone(),
            vocab,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn transform(&self, x: &Frame) -> Result<EncodedMatrix, SchemaError> {
        let mut values = Vec::with_capacity(self.columns.len());
        let mut kinds = Vec::with_capacity(self.columns.len());
        let mut cardinality = Vec::with_capacity(self.columns.len());

        for (spec, vocab) in self.columns.iter().zip(&self.vocab) {
            let idx = x
                .column_index(&spec.name)
                .ok_or_else(|| SchemaError::MissingColumn {
                    column: spec.name.clone(),
                    context: "model input".to_string(),
                })?;
            let found = x.columns[idx].kind;
            if found != spec.kind {
                return Err(SchemaError::ColumnKind {
                    column: spec.name.clone(),
                    context: "model input".to_string(),
                    expected: spec.kind,
                    found,
                });
            }
            let column = x
                .rows
                .iter()
                .map(|row| encode_cell(&row[idx], spec.kind, vocab))
                .collect();
            values.push(column);
            kinds.push(spec.kind);
            cardinality.push(vocab.len());
        }

        Ok(EncodedMatrix {
            n_rows: x.n_rows(),
            kinds,
            cardinality,
            values,
        })
    }
}

fn encode_cell(cell: &Cell, kind: ColumnKind, vocab: &[String]) -> f64 {
    match (kind, cell) {
        (ColumnKind::Numeric, Cell::Num(v)) => *v,
        (ColumnKind::Categorical, Cell::Cat(s)) => vocab
            .binary_search_by(|word| word.as_str().cmp(s))
            .map(|code| code as f64)
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// One fitted model per label column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSet<M> {
    pub models: BTreeMap<LabelColumn, M>,
}

impl<M: BinaryClassifier> ModelSet<M> {
    pub fn get(&self, label: LabelColumn) -> Result<&M, SchemaError> {
        self.models
            .get(&label)
            .ok_or_else(|| SchemaError::MissingModel(label.name().to_string()))
    }

    /// Probabilities for every row, one column per label.
    pub fn predict(&self, x: &Frame) -> Result<Frame> {
        let mut columns = Vec::with_capacity(LabelColumn::ALL.len());
        for label in LabelColumn::ALL {
            let probs = self
                .get(label)?
                .predict_probability(x)
                .with_context(|| format!("predict {}", label.name()))?;
            columns.push(probs);
        }

        let mut frame = Frame::new(
            LabelColumn::ALL
                .iter()
                .map(|l| ColumnSpec::numeric(l.name()))
                .collect(),
        );
        for i in 0..x.n_rows() {
            frame.push_row(columns.iter().map(|c| Cell::Num(c[i])).collect());
        }
        Ok(frame)
    }
}

fn label_values(y: &Frame, label: LabelColumn, expected_rows: usize) -> Result<Vec<bool>> {
    if y.n_rows() != expected_rows {
        return Err(SchemaError::RowCount {
            context: "features vs labels".to_string(),
            left: expected_rows,
            right: y.n_rows(),
        }
        .into());
    }
    Ok(y.numeric_column(label.name())?
        .into_iter()
        .map(|v| v > 0.5)
        .collect())
}

/// Fit one fresh model per label column on the same features.
pub fn train_models<M, F>(x: &Frame, y: &Frame, mut make_model: F) -> Result<ModelSet<M>>
where
    M: BinaryClassifier,
    F: FnMut() -> M,
{
    info!(
        categorical = ?categorical_columns(&x.columns),
        "categorical feature columns"
    );
    let mut models = BTreeMap::new();
    for label in LabelColumn::ALL {
        let target = label_values(y, label, x.n_rows())?;
        let positives = target.iter().filter(|v| **v).count();
        let mut model = make_model();
        model
            .fit(x, &target)
            .with_context(|| format!("fit model for {}", label.name()))?;
        info!(
            label = label.name(),
            rows = target.len(),
            positives,
            "trained classifier"
        );
        models.insert(label, model);
    }
    Ok(ModelSet { models })
}

pub fn evaluate_models<M: BinaryClassifier>(
    models: &ModelSet<M>,
    x: &Frame,
    y: &Frame,
) -> Result<BTreeMap<LabelColumn, Metrics>> {
    let mut out = BTreeMap::new();
    for label in LabelColumn::ALL {
        let target = label_values(y, label, x.n_rows())?;
        let probs = models.get(label)?.predict_probability(x)?;
        for bin in calibration_bins(&probs, &target, 10).iter().filter(|b| b.count > 0) {
            debug!(
                label = label.name(),
                bucket = format!("{:.1}-{:.1}", bin.bucket_start, bin.bucket_end),
                count = bin.count,
                avg_pred = bin.avg_pred,
                actual = bin.actual_rate,
                "calibration"
            );
        }
        out.insert(label, evaluate_binary(&probs, &target));
    }
    Ok(out)
}

pub fn format_metrics(label: LabelColumn, m: &Metrics) -> String {
    let auc = m
        .roc_auc
        .map(|v| format!("{v:.5}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Eval: {} | Brier: {:.5} | AUC: {} | log loss: {:.5} | rows: {} | positive: {}",
        label.name(),
        m.brier,
        auc,
        m.log_loss,
        m.samples,
        m.positives
    )
}

pub fn save_models<M: Serialize>(models: &ModelSet<M>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(models).context("serialize models")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn load_models<M: DeserializeOwned>(path: &Path) -> Result<ModelSet<M>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse models {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        let mut f = Frame::new(vec![
            ColumnSpec::categorical("actiontype_a0"),
            ColumnSpec::numeric("start_x_a0"),
        ]);
        f.push_row(vec![Cell::Cat("shot".into()), Cell::Num(90.0)]);
        f.push_row(vec![Cell::Cat("other".into()), Cell::Num(10.0)]);
        f.push_row(vec![Cell::Missing, Cell::Num(50.0)]);
        f
    }

    #[derive(Debug)]
    struct Constant(f64);

    impl BinaryClassifier for Constant {
        fn fit(&mut self, _x: &Frame, y: &[bool]) -> Result<()> {
            self.0 = y.iter().filter(|v| **v).count() as f64 / y.len() as f64;
            Ok(())
        }

        fn predict_probability(&self, x: &Frame) -> Result<Vec<f64>> {
            Ok(vec![self.0; x.n_rows()])
        }
    }

    #[test]
    fn encoder_uses_sorted_vocabulary_and_maps_unseen_to_missing() {
        let enc = CategoricalEncoder::fit(&frame());
        let m = enc.transform(&frame()).unwrap();
        assert_eq!(m.cardinality, vec![2, 0]);
        assert_eq!(m.values[0][0], 1.0);
        assert_eq!(m.values[0][1], 0.0);
        assert!(m.values[0][2].is_nan());

        let mut other = frame();
        other.rows[0][0] = Cell::Cat("carry".into());
        assert!(enc.transform(&other).unwrap().values[0][0].is_nan());
    }

    #[test]
    fn encoder_rejects_kind_changes() {
        let enc = CategoricalEncoder::fit(&frame());
        let mut changed = frame();
        changed.columns[0].kind = ColumnKind::Numeric;
        let err = enc.transform(&changed).unwrap_err();
        assert!(matches!(err, SchemaError::ColumnKind { .. }));
    }

    #[test]
    fn trains_one_model_per_label() {
        let x = frame();
        let mut y = Frame::new(vec![ColumnSpec::numeric(SCORES), ColumnSpec::numeric(CONCEDES)]);
        y.push_row(vec![Cell::Num(1.0), Cell::Num(0.0)]);
        y.push_row(vec![Cell::Num(0.0), Cell::Num(0.0)]);
        y.push_row(vec![Cell::Num(0.0), Cell::Num(1.0)]);

        let models = train_models(&x, &y, || Constant(0.0)).unwrap();
        assert_eq!(models.models.len(), 2);
        let preds = models.predict(&x).unwrap();
        assert_eq!(preds.column_names(), vec![SCORES, CONCEDES]);
        assert_eq!(preds.rows[0][0], Cell::Num(1.0 / 3.0));

        let report = evaluate_models(&models, &x, &y).unwrap();
        assert_eq!(report[&LabelColumn::Scores].positives, 1);
    }

    #[test]
    fn label_row_count_must_match() {
        let x = frame();
        let y = Frame::new(vec![ColumnSpec::numeric(SCORES), ColumnSpec::numeric(CONCEDES)]);
        let err = train_models(&x, &y, || Constant(0.0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::RowCount { .. })
        ));
    }

    #[test]
    fn missing_model_is_reported() {
        let set: ModelSet<Constant> = ModelSet {
            models: BTreeMap::new(),
        };
        assert!(matches!(
            set.get(LabelColumn::Concedes),
            Err(SchemaError::MissingModel(name)) if name == "concedes"
        ));
    }
}
