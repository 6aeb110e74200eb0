use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract violations between tables. These are never recovered from.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing column '{column}' in {context}")]
    MissingColumn { column: String, context: String },

    #[error("column '{column}' in {context} has kind {found:?}, expected {expected:?}")]
    ColumnKind {
        column: String,
        context: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("row count mismatch in {context}: {left} vs {right}")]
    RowCount {
        context: String,
        left: usize,
        right: usize,
    },

    #[error("schema fingerprint mismatch for {key}: stored {stored}, computed {computed}")]
    Fingerprint {
        key: String,
        stored: String,
        computed: String,
    },

    #[error("no model trained for label '{0}'")]
    MissingModel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Num(f64),
    Cat(String),
    Missing,
}

impl Cell {
    pub fn flag(v: bool) -> Self {
        Cell::Num(if v { 1.0 } else { 0.0 })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Cell::Cat(s) => Some(s),
            _ => None,
        }
    }
}

/// Row-major table keyed by ordinal position. Features, labels and
/// predictions all travel as frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn require(&self, name: &str, context: &str) -> Result<usize, SchemaError> {
        self.column_index(name)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: name.to_string(),
                context: context.to_string(),
            })
    }

    /// Project onto `names` in the given order.
    pub fn select(&self, names: &[String]) -> Result<Frame, SchemaError> {
        let idx = names
            .iter()
            .map(|n| self.require(n, "feature table"))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = idx.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| idx.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Frame { columns, rows })
    }

    /// Numeric view of one column; non-numeric cells read as NaN.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, SchemaError> {
        let idx = self.require(name, "numeric column lookup")?;
        Ok(self
            .rows
            .iter()
            .map(|row| row[idx].as_f64().unwrap_or(f64::NAN))
            .collect())
    }

    /// Stack frames with identical schemas, in order.
    pub fn concat(frames: Vec<Frame>) -> Result<Frame, SchemaError> {
        let mut iter = frames.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Frame::default());
        };
        for frame in iter {
            if frame.columns != out.columns {
                let missing = out
                    .columns
                    .iter()
                    .find(|c| !frame.columns.contains(c))
                    .or_else(|| frame.columns.iter().find(|c| !out.columns.contains(c)))
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "<column order>".to_string());
                return Err(SchemaError::MissingColumn {
                    column: missing,
                    context: "concatenated frames".to_string(),
                });
            }
            out.rows.extend(frame.rows);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        let mut f = Frame::new(vec![
            ColumnSpec::categorical("actiontype_a0"),
            ColumnSpec::numeric("start_x_a0"),
        ]);
        f.push_row(vec![Cell::Cat("shot".into()), Cell::Num(90.0)]);
        f.push_row(vec![Cell::Cat("other".into()), Cell::Num(10.0)]);
        f
    }

    #[test]
    fn select_reorders_and_rejects_missing() {
        let f = sample();
        let picked = f.select(&["start_x_a0".to_string()]).unwrap();
        assert_eq!(picked.column_names(), vec!["start_x_a0"]);
        assert_eq!(picked.rows[1], vec![Cell::Num(10.0)]);

        let err = f.select(&["dx_a01".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { .. }));
    }

    #[test]
    fn concat_requires_identical_schema() {
        let both = Frame::concat(vec![sample(), sample()]).unwrap();
        assert_eq!(both.n_rows(), 4);

        let other = Frame::new(vec![ColumnSpec::numeric("start_x_a0")]);
        assert!(Frame::concat(vec![sample(), other]).is_err());
    }

    #[test]
    fn cells_round_trip_through_json() {
        let f = sample();
        let mut with_missing = f.clone();
        with_missing.rows[0][1] = Cell::Missing;
        let raw = serde_json::to_string(&with_missing.rows).unwrap();
        let back: Vec<Vec<Cell>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, with_missing.rows);
    }
}
