//! Marginal constraints: a dimension and a target total per category.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{IpfError, Result};

/// One attribute, or an ordered list of attributes whose joint value defines
/// the category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimension(Vec<String>);

impl Dimension {
    pub fn attributes(&self) -> &[String] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_joint(&self) -> bool {
        self.0.len() > 1
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for Dimension {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for Dimension {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for Dimension {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Dimension {
    fn from(names: [&str; N]) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => f.write_str(single),
            many => write!(f, "[{}]", many.join(", ")),
        }
    }
}

/// A category value, or a tuple of values for a joint dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryKey(Vec<String>);

impl CategoryKey {
    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn into_values(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for CategoryKey {
    fn from(v: &str) -> Self {
        Self(vec![v.to_string()])
    }
}

impl From<String> for CategoryKey {
    fn from(v: String) -> Self {
        Self(vec![v])
    }
}

impl From<Vec<String>> for CategoryKey {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl From<Vec<&str>> for CategoryKey {
    fn from(v: Vec<&str>) -> Self {
        Self(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CategoryKey {
    fn from(v: [&str; N]) -> Self {
        Self(v.into_iter().map(str::to_string).collect())
    }
}

/// A marginal constraint.
///
/// ```
/// use ipf_engine::Constraint;
///
/// let by_sex = Constraint::new("sex").target("M", 30.0).target("F", 10.0);
/// let by_cell = Constraint::new(["sex", "age"]).target(["M", "young"], 12.0);
/// assert_eq!(by_sex.targets().len(), 2);
/// assert!(by_cell.dimension().is_joint());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawConstraint")]
pub struct Constraint {
    dimension: Dimension,
    targets: IndexMap<Vec<String>, f64>,
}

impl Constraint {
    pub fn new(dimension: impl Into<Dimension>) -> Self {
        Self {
            dimension: dimension.into(),
            targets: IndexMap::new(),
        }
    }

    /// Set the target total for a category. A repeated key overwrites the
    /// earlier total but keeps its position.
    pub fn target(mut self, category: impl Into<CategoryKey>, total: f64) -> Self {
        self.targets.insert(category.into().into_values(), total);
        self
    }

    pub fn with_targets<I, K>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<CategoryKey>,
    {
        for (k, v) in targets {
            self = self.target(k, v);
        }
        self
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    pub fn targets(&self) -> &IndexMap<Vec<String>, f64> {
        &self.targets
    }

    pub fn target_for(&self, category: &[String]) -> Option<f64> {
        self.targets.get(category).copied()
    }

    pub fn target_sum(&self) -> f64 {
        self.targets.values().sum()
    }

    /// Check the constraint is internally consistent: non-empty dimension
    /// without repeated attributes, every key of the dimension's arity, every
    /// total finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let attrs = self.dimension.attributes();
        if attrs.is_empty() {
            return Err(IpfError::SchemaMismatch(
                "constraint dimension has no attributes".to_string(),
            ));
        }
        for (i, a) in attrs.iter().enumerate() {
            if attrs[..i].contains(a) {
                return Err(IpfError::SchemaMismatch(format!(
                    "attribute '{a}' repeated in dimension {}",
                    self.dimension
                )));
            }
        }
        for (key, &total) in &self.targets {
            if key.len() != attrs.len() {
                return Err(IpfError::SchemaMismatch(format!(
                    "target category {key:?} has {} values but dimension {} has {}",
                    key.len(),
                    self.dimension,
                    attrs.len()
                )));
            }
            if !total.is_finite() || total < 0.0 {
                return Err(IpfError::InvalidTarget {
                    category: key.clone(),
                    value: total,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deserialization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(v: OneOrMany) -> Self {
        match v {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RawTarget {
    category: OneOrMany,
    total: f64,
}

#[derive(Deserialize)]
struct RawConstraint {
    dimension: OneOrMany,
    #[serde(default)]
    targets: Vec<RawTarget>,
}

impl TryFrom<RawConstraint> for Constraint {
    type Error = IpfError;

    fn try_from(raw: RawConstraint) -> Result<Self> {
        let dimension = Dimension(raw.dimension.into());
        let constraint = raw.targets.into_iter().fold(Constraint::new(dimension), |c, t| {
            c.target(Vec::<String>::from(t.category), t.total)
        });
        constraint.validate()?;
        Ok(constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_name_normalized() {
        let c = Constraint::new("sex").target("M", 1.0);
        assert_eq!(c.dimension().attributes(), &["sex".to_string()]);
        assert!(!c.dimension().is_joint());
        assert_eq!(c.target_for(&["M".to_string()]), Some(1.0));
        assert_eq!(c.dimension().to_string(), "sex");
    }

    #[test]
    fn test_joint_display() {
        let c = Constraint::new(["sex", "age"]);
        assert_eq!(c.dimension().to_string(), "[sex, age]");
        assert_eq!(c.dimension().arity(), 2);
    }

    #[test]
    fn test_arity_mismatch() {
        let c = Constraint::new(["sex", "age"]).target("M", 5.0);
        assert!(matches!(c.validate(), Err(IpfError::SchemaMismatch(_))));
    }

    #[test]
    fn test_negative_and_nan_targets() {
        let c = Constraint::new("sex").target("M", -1.0);
        assert!(matches!(c.validate(), Err(IpfError::InvalidTarget { .. })));
        let c = Constraint::new("sex").target("M", f64::NAN);
        assert!(matches!(c.validate(), Err(IpfError::InvalidTarget { .. })));
    }

    #[test]
    fn test_repeated_attribute() {
        let c = Constraint::new(["sex", "sex"]);
        assert!(matches!(c.validate(), Err(IpfError::SchemaMismatch(_))));
        assert!(Constraint::new(Vec::<String>::new()).validate().is_err());
    }

    #[test]
    fn test_overwrite_keeps_order() {
        let c = Constraint::new("r")
            .with_targets([("a", 1.0), ("b", 2.0)])
            .target("a", 3.0);
        let keys: Vec<_> = c.targets().keys().map(|k| k[0].as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(c.target_sum(), 5.0);
    }
}
