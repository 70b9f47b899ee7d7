//! Design matrix for initial-weight inference.
//!
//! Single-attribute constraints contribute one 0/1 column per observed level.
//! Joint constraints contribute the pairwise products of their attributes'
//! one-hot columns, restricted to pairs drawn from different attributes.

use indexmap::IndexSet;
use ndarray::{Array2, ArrayView2};

use crate::constraint::Constraint;
use crate::dataset::{CategoricalColumn, Dataset};
use crate::error::Result;

/// Feature matrix, one row per dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Array2<f64>,
    names: Vec<String>,
}

impl FeatureMatrix {
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    fn from_columns(n_rows: usize, columns: Vec<(String, Vec<f64>)>) -> Self {
        let (names, data): (Vec<String>, Vec<Vec<f64>>) = columns.into_iter().unzip();
        let values = Array2::from_shape_fn((n_rows, data.len()), |(i, j)| data[j][i]);
        Self { values, names }
    }
}

/// Turns a dataset and its constraints into numeric features.
pub trait FeatureEncoder {
    fn encode(&self, dataset: &Dataset, constraints: &[Constraint]) -> Result<FeatureMatrix>;
}

/// One-hot encoding with cross-attribute interaction terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneHotInteractionEncoder;

impl FeatureEncoder for OneHotInteractionEncoder {
    fn encode(&self, dataset: &Dataset, constraints: &[Constraint]) -> Result<FeatureMatrix> {
        let mut singles: IndexSet<&str> = IndexSet::new();
        let mut joints: Vec<&[String]> = Vec::new();
        for c in constraints {
            let attrs = c.dimension().attributes();
            if c.dimension().is_joint() {
                joints.push(attrs);
            } else if let Some(a) = attrs.first() {
                singles.insert(a.as_str());
            }
        }

        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

        for name in singles {
            let dim = [name.to_string()];
            let col = dataset.dimension_columns(&dim)?[0];
            columns.extend(one_hot(name, col));
        }

        for attrs in joints {
            let cols = dataset.dimension_columns(attrs)?;
            let encoded: Vec<(usize, String, Vec<f64>)> = attrs
                .iter()
                .zip(cols)
                .enumerate()
                .flat_map(|(a, (name, col))| {
                    one_hot(name, col).map(move |(label, values)| (a, label, values))
                })
                .collect();

            for (i, (attr_i, name_i, values_i)) in encoded.iter().enumerate() {
                for (attr_j, name_j, values_j) in &encoded[i + 1..] {
                    if attr_i == attr_j {
                        continue;
                    }
                    let product = values_i.iter().zip(values_j).map(|(x, y)| x * y).collect();
                    columns.push((format!("{name_i}*{name_j}"), product));
                }
            }
        }

        Ok(FeatureMatrix::from_columns(dataset.len(), columns))
    }
}

/// One 0/1 column per level, in level order.
fn one_hot<'a>(
    name: &'a str,
    column: &'a CategoricalColumn,
) -> impl Iterator<Item = (String, Vec<f64>)> + 'a {
    column.levels().enumerate().map(move |(code, level)| {
        let values = column
            .codes()
            .iter()
            .map(|&c| if c as usize == code { 1.0 } else { 0.0 })
            .collect();
        (format!("{name}={level}"), values)
    })
}

/// Build the design matrix with the default encoder.
pub fn build_features(dataset: &Dataset, constraints: &[Constraint]) -> Result<FeatureMatrix> {
    OneHotInteractionEncoder.encode(dataset, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IpfError;
    use ndarray::array;

    fn dataset() -> Dataset {
        Dataset::from_rows(
            &["sex", "region", "age"],
            [["M", "N", "young"], ["F", "S", "old"], ["M", "S", "old"]],
        )
        .unwrap()
    }

    #[test]
    fn test_single_dimension_one_hot() {
        let constraints = vec![
            Constraint::new("sex"),
            Constraint::new("region"),
            Constraint::new("sex"),
        ];
        let fm = build_features(&dataset(), &constraints).unwrap();
        assert_eq!(fm.names(), &["sex=M", "sex=F", "region=N", "region=S"]);
        assert_eq!(
            fm.values(),
            array![
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0, 1.0],
                [1.0, 0.0, 0.0, 1.0]
            ]
        );
    }

    #[test]
    fn test_joint_dimension_drops_same_attribute_pairs() {
        let constraints = vec![Constraint::new(["sex", "region"])];
        let fm = build_features(&dataset(), &constraints).unwrap();
        assert_eq!(
            fm.names(),
            &[
                "sex=M*region=N",
                "sex=M*region=S",
                "sex=F*region=N",
                "sex=F*region=S"
            ]
        );
        assert_eq!(
            fm.values(),
            array![
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0]
            ]
        );
    }

    #[test]
    fn test_three_way_joint_pairs() {
        let constraints = vec![Constraint::new("age"), Constraint::new(["sex", "region", "age"])];
        let fm = build_features(&dataset(), &constraints).unwrap();
        // age one-hot (2) + sex×region (4) + sex×age (4) + region×age (4)
        assert_eq!(fm.n_features(), 14);
        assert_eq!(fm.n_rows(), 3);
    }

    #[test]
    fn test_unknown_attribute() {
        let err = build_features(&dataset(), &[Constraint::new("income")]).unwrap_err();
        assert!(matches!(err, IpfError::SchemaMismatch(_)));
    }
}
