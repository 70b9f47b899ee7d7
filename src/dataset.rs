//! In-memory micro dataset: dictionary-encoded categorical columns plus a
//! weight column.

use indexmap::{IndexMap, IndexSet};

use crate::error::{IpfError, Result};

/// A categorical column stored as level codes.
///
/// Levels are kept in first-seen order; `codes[i]` indexes into `levels`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    levels: IndexSet<String>,
    codes: Vec<u32>,
}

impl CategoricalColumn {
    /// Encode a sequence of values, assigning codes in first-seen order.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut levels = IndexSet::new();
        let codes = values
            .into_iter()
            .map(|v| {
                let (idx, _) = levels.insert_full(v.into());
                idx as u32
            })
            .collect();
        Self { levels, codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    pub fn levels(&self) -> impl ExactSizeIterator<Item = &str> {
        self.levels.iter().map(String::as_str)
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Level string for a code.
    pub fn level(&self, code: u32) -> Option<&str> {
        self.levels.get_index(code as usize).map(String::as_str)
    }

    /// Code for a level string, if the level occurs in the column.
    pub fn code_of(&self, level: &str) -> Option<u32> {
        self.levels.get_index_of(level).map(|i| i as u32)
    }

    /// Value of row `row`.
    pub fn value(&self, row: usize) -> &str {
        self.levels[self.codes[row] as usize].as_str()
    }
}

/// Rows with named categorical attributes and one weight per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: IndexMap<String, CategoricalColumn>,
    weights: Vec<f64>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset from `(name, values)` pairs. Every column must have the
    /// same length; weights start at 1.0.
    pub fn from_columns<I, N, V, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let encoded = columns
            .into_iter()
            .map(|(name, values)| (name.into(), CategoricalColumn::from_values(values)));
        Self::from_encoded(encoded)
    }

    /// Build a dataset from row tuples, one value per named column.
    pub fn from_rows<R, S>(names: &[&str], rows: R) -> Result<Self>
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (i, row) in rows.into_iter().enumerate() {
            let mut width = 0;
            for (j, v) in row.into_iter().enumerate() {
                let col = values.get_mut(j).ok_or_else(|| {
                    IpfError::InvalidData(format!(
                        "row {i} has more values than the {} named columns",
                        names.len()
                    ))
                })?;
                col.push(v.into());
                width += 1;
            }
            if width != names.len() {
                return Err(IpfError::InvalidData(format!(
                    "row {i} has {width} values, expected {}",
                    names.len()
                )));
            }
        }
        Self::from_columns(names.iter().copied().zip(values))
    }

    /// Build a dataset from already-encoded columns.
    pub fn from_encoded<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, CategoricalColumn)>,
    {
        let mut map: IndexMap<String, CategoricalColumn> = IndexMap::new();
        let mut n_rows: Option<usize> = None;

        for (name, column) in columns {
            match n_rows {
                None => n_rows = Some(column.len()),
                Some(n) if n != column.len() => {
                    return Err(IpfError::InvalidData(format!(
                        "column '{name}' has {} rows, expected {n}",
                        column.len()
                    )));
                }
                Some(_) => {}
            }
            if map.insert(name.clone(), column).is_some() {
                return Err(IpfError::InvalidData(format!("duplicate column '{name}'")));
            }
        }

        let n_rows = n_rows.unwrap_or(0);
        Ok(Self {
            columns: map,
            weights: vec![1.0; n_rows],
            n_rows,
        })
    }

    /// Replace the weight column. Weights must be finite and match the row count.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        self.set_weights(weights)?;
        Ok(self)
    }

    pub(crate) fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if weights.len() != self.n_rows {
            return Err(IpfError::InvalidData(format!(
                "weight column has {} values, dataset has {} rows",
                weights.len(),
                self.n_rows
            )));
        }
        if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
            return Err(IpfError::InvalidData(format!(
                "weight at row {i} is not finite"
            )));
        }
        self.weights = weights;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn column(&self, name: &str) -> Option<&CategoricalColumn> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Look up the columns of a dimension, failing on the first unknown name.
    pub(crate) fn dimension_columns(&self, dimension: &[String]) -> Result<Vec<&CategoricalColumn>> {
        dimension
            .iter()
            .map(|name| {
                self.columns.get(name).ok_or_else(|| {
                    IpfError::SchemaMismatch(format!("attribute '{name}' not found in dataset"))
                })
            })
            .collect()
    }

    /// Partition rows by their joint code tuple over `dimension`, groups in
    /// first-seen order.
    pub(crate) fn partition(&self, dimension: &[String]) -> Result<IndexMap<Vec<u32>, Vec<usize>>> {
        let columns = self.dimension_columns(dimension)?;
        let mut map: IndexMap<Vec<u32>, Vec<usize>> = IndexMap::new();
        for row in 0..self.n_rows {
            let key: Vec<u32> = columns.iter().map(|c| c.codes[row]).collect();
            map.entry(key).or_default().push(row);
        }
        Ok(map)
    }

    /// Decode a joint code tuple back into level strings.
    pub(crate) fn decode_key(&self, dimension: &[String], key: &[u32]) -> Vec<String> {
        dimension
            .iter()
            .zip(key)
            .map(|(name, &code)| {
                self.columns
                    .get(name)
                    .and_then(|c| c.level(code))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    /// Encode level strings into a joint code tuple. `None` if any level does
    /// not occur in the data.
    pub(crate) fn encode_key(&self, columns: &[&CategoricalColumn], key: &[String]) -> Option<Vec<u32>> {
        columns
            .iter()
            .zip(key)
            .map(|(c, level)| c.code_of(level))
            .collect()
    }
}
