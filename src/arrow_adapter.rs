//! Arrow middleware for IPF raking.
//!
//! Converts `RecordBatch` columns into a [`Dataset`] and writes fitted weights
//! back as a Float64 column.
//!
//! Two tiers:
//!   1. Column helpers: categorical extraction, weight read/write
//!   2. `fit_batch`: RecordBatch in, RecordBatch with weight column out

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, RecordBatch};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Schema, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use indexmap::IndexSet;

use crate::config::FitOptions;
use crate::constraint::Constraint;
use crate::dataset::{CategoricalColumn, Dataset};
use crate::engine::{self, FitResult};
use crate::error::{IpfError, Result};

/// Level assigned to null entries.
pub const NULL_LEVEL: &str = "__null__";

/// Default name of the weight column.
pub const WEIGHT_COLUMN: &str = "weight";

// ---------------------------------------------------------------------------
// Tier 1: Column helpers
// ---------------------------------------------------------------------------

fn column_index(batch: &RecordBatch, col_name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(col_name)
        .map_err(|_| IpfError::SchemaMismatch(format!("column '{col_name}' not found in Arrow data")))
}

macro_rules! level_strings {
    ($arr:expr) => {{
        let arr = $arr;
        (0..arr.len())
            .map(|i| {
                if arr.is_null(i) {
                    NULL_LEVEL.to_string()
                } else {
                    arr.value(i).to_string()
                }
            })
            .collect::<Vec<String>>()
    }};
}

/// Extract a column as categorical levels.
/// Handles Utf8, LargeUtf8, Utf8View, Boolean, integer and Float64 types.
/// Null values become [`NULL_LEVEL`].
pub fn extract_categorical_column(batch: &RecordBatch, col_name: &str) -> Result<CategoricalColumn> {
    let array = batch.column(column_index(batch, col_name)?);

    let values = match array.data_type() {
        DataType::Utf8 => level_strings!(array.as_string::<i32>()),
        DataType::LargeUtf8 => level_strings!(array.as_string::<i64>()),
        DataType::Utf8View => level_strings!(array.as_string_view()),
        DataType::Boolean => level_strings!(array.as_boolean()),
        DataType::Int8 => level_strings!(array.as_primitive::<Int8Type>()),
        DataType::Int16 => level_strings!(array.as_primitive::<Int16Type>()),
        DataType::Int32 => level_strings!(array.as_primitive::<Int32Type>()),
        DataType::Int64 => level_strings!(array.as_primitive::<Int64Type>()),
        DataType::UInt8 => level_strings!(array.as_primitive::<UInt8Type>()),
        DataType::UInt16 => level_strings!(array.as_primitive::<UInt16Type>()),
        DataType::UInt32 => level_strings!(array.as_primitive::<UInt32Type>()),
        DataType::UInt64 => level_strings!(array.as_primitive::<UInt64Type>()),
        DataType::Float64 => level_strings!(array.as_primitive::<Float64Type>()),
        dt => {
            return Err(IpfError::InvalidData(format!(
                "column '{col_name}' has unsupported type {dt:?} for a categorical attribute"
            )));
        }
    };

    Ok(CategoricalColumn::from_values(values))
}

/// Read a non-null Float64 weight column.
pub fn extract_weight_column(batch: &RecordBatch, col_name: &str) -> Result<Vec<f64>> {
    let array = batch.column(column_index(batch, col_name)?);
    if array.data_type() != &DataType::Float64 {
        return Err(IpfError::InvalidData(format!(
            "weight column '{col_name}' has type {:?}, expected Float64",
            array.data_type()
        )));
    }
    if array.null_count() > 0 {
        return Err(IpfError::InvalidData(format!(
            "weight column '{col_name}' contains nulls"
        )));
    }
    Ok(array.as_primitive::<Float64Type>().values().to_vec())
}

/// Replace the weight column if the batch already has one, otherwise append it.
/// Other columns are Arc-shared (zero-copy).
pub fn set_weight_column(batch: &RecordBatch, weights: Vec<f64>, column_name: &str) -> Result<RecordBatch> {
    let weight_array: ArrayRef = Arc::new(Float64Array::from(weights));
    let weight_field = Arc::new(Field::new(column_name, DataType::Float64, false));

    let schema = batch.schema();
    let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    match schema.index_of(column_name) {
        Ok(idx) => {
            fields[idx] = weight_field;
            columns[idx] = weight_array;
        }
        Err(_) => {
            fields.push(weight_field);
            columns.push(weight_array);
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Attribute names referenced by `constraints`, in first-use order.
pub fn constraint_columns(constraints: &[Constraint]) -> Vec<String> {
    let names: IndexSet<&String> = constraints
        .iter()
        .flat_map(|c| c.dimension().attributes())
        .collect();
    names.into_iter().cloned().collect()
}

/// Build a dataset from the named batch columns. If `weight_column` exists in
/// the batch its values become the dataset's weights.
pub fn dataset_from_batch(
    batch: &RecordBatch,
    columns: &[String],
    weight_column: Option<&str>,
) -> Result<Dataset> {
    // The row count comes from the categorical columns.
    if columns.is_empty() && batch.num_rows() > 0 {
        return Err(IpfError::InvalidData(
            "at least one categorical column is required".to_string(),
        ));
    }

    let encoded = columns
        .iter()
        .map(|name| Ok((name.clone(), extract_categorical_column(batch, name)?)))
        .collect::<Result<Vec<_>>>()?;
    let mut dataset = Dataset::from_encoded(encoded)?;

    if let Some(name) = weight_column
        && batch.schema().index_of(name).is_ok()
    {
        dataset = dataset.with_weights(extract_weight_column(batch, name)?)?;
    }
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Tier 2: Fitting a batch
// ---------------------------------------------------------------------------

/// Fit a RecordBatch. Returns the batch with its weight column replaced or
/// appended, plus the fit diagnostics.
pub fn fit_batch(
    batch: &RecordBatch,
    constraints: &[Constraint],
    opts: &FitOptions,
    weight_column: &str,
) -> Result<(RecordBatch, FitResult)> {
    if constraints.is_empty() {
        return Err(IpfError::InvalidOptions(
            "at least one constraint is required".to_string(),
        ));
    }
    let columns = constraint_columns(constraints);
    let dataset = dataset_from_batch(batch, &columns, None)?;
    let result = engine::fit(&dataset, constraints, opts)?;
    let out = set_weight_column(batch, result.weights().to_vec(), weight_column)?;
    Ok((out, result))
}
