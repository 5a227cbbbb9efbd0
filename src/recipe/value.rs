use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{RecipeError, RecipeResult};

/// Element type of an array payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float64,
    Int64,
    Bool,
    Str,
}

impl DType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::Str => "str",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float64" => Some(Self::Float64),
            "int64" => Some(Self::Int64),
            "bool" => Some(Self::Bool),
            "str" => Some(Self::Str),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Float64 | Self::Int64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flat, row-major element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ArrayData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(values) => values.len(),
            Self::Int64(values) => values.len(),
            Self::Bool(values) => values.len(),
            Self::Str(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Int64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
            Self::Str(_) => DType::Str,
        }
    }

    #[must_use]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            Self::Float64(values) => values.get(index).copied(),
            Self::Int64(values) => values.get(index).map(|value| *value as f64),
            Self::Bool(values) => values.get(index).map(|value| f64::from(u8::from(*value))),
            Self::Str(_) => None,
        }
    }

    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        match self {
            Self::Float64(values) => values.iter().any(|value| !value.is_finite()),
            _ => false,
        }
    }

    /// Element-wise equality where NaN matches NaN.
    #[must_use]
    pub fn same_values(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(left), Self::Float64(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right)
                        .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
            }
            (Self::Int64(left), Self::Int64(right)) => left == right,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Str(left), Self::Str(right)) => left == right,
            _ => false,
        }
    }
}

/// N-dimensional array with an explicit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NdArrayRepr", into = "NdArrayRepr")]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> RecipeResult<Self> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != data.len() {
            return Err(RecipeError::InvalidData(format!(
                "array shape {shape:?} does not match {} elements",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    #[must_use]
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Float64(values),
        }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Int64(values),
        }
    }

    #[must_use]
    pub fn from_strings(values: Vec<String>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Str(values),
        }
    }

    /// Row-major 2-D float array.
    pub fn from_rows(rows: &[Vec<f64>]) -> RecipeResult<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != ncols) {
            return Err(RecipeError::InvalidData(
                "2-D array rows must have equal length".to_owned(),
            ));
        }
        let values = rows.iter().flatten().copied().collect();
        Self::new(vec![rows.len(), ncols], ArrayData::Float64(values))
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Numeric contents as `f64`, `None` for string arrays.
    #[must_use]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        (0..self.len()).map(|index| self.data.get_f64(index)).collect()
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data.same_values(&other.data)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NdArrayRepr {
    dtype: DType,
    shape: Vec<usize>,
    values: Vec<serde_json::Value>,
}

impl From<NdArray> for NdArrayRepr {
    fn from(array: NdArray) -> Self {
        let dtype = array.data.dtype();
        let values = match array.data {
            ArrayData::Float64(values) => values
                .into_iter()
                .map(|value| {
                    serde_json::Number::from_f64(value)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number)
                })
                .collect(),
            ArrayData::Int64(values) => values.into_iter().map(serde_json::Value::from).collect(),
            ArrayData::Bool(values) => values.into_iter().map(serde_json::Value::Bool).collect(),
            ArrayData::Str(values) => values.into_iter().map(serde_json::Value::String).collect(),
        };
        Self {
            dtype,
            shape: array.shape,
            values,
        }
    }
}

impl TryFrom<NdArrayRepr> for NdArray {
    type Error = RecipeError;

    fn try_from(repr: NdArrayRepr) -> Result<Self, Self::Error> {
        let bad = |index: usize| {
            RecipeError::RecipeCorrupt(format!(
                "inline {} array has an invalid element at index {index}",
                repr.dtype
            ))
        };
        let data = match repr.dtype {
            DType::Float64 => ArrayData::Float64(
                repr.values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| value.as_f64().ok_or_else(|| bad(index)))
                    .collect::<RecipeResult<_>>()?,
            ),
            DType::Int64 => ArrayData::Int64(
                repr.values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| value.as_i64().ok_or_else(|| bad(index)))
                    .collect::<RecipeResult<_>>()?,
            ),
            DType::Bool => ArrayData::Bool(
                repr.values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| value.as_bool().ok_or_else(|| bad(index)))
                    .collect::<RecipeResult<_>>()?,
            ),
            DType::Str => ArrayData::Str(
                repr.values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| {
                        value.as_str().map(str::to_owned).ok_or_else(|| bad(index))
                    })
                    .collect::<RecipeResult<_>>()?,
            ),
        };
        NdArray::new(repr.shape, data)
    }
}

/// Named, equal-length 1-D columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr", into = "TableRepr")]
pub struct Table {
    columns: IndexMap<String, NdArray>,
}

impl Table {
    pub fn new(columns: IndexMap<String, NdArray>) -> RecipeResult<Self> {
        let mut rows = None;
        for (name, column) in &columns {
            if column.ndim() != 1 {
                return Err(RecipeError::InvalidData(format!(
                    "table column `{name}` must be 1-D"
                )));
            }
            match rows {
                None => rows = Some(column.len()),
                Some(expected) if expected != column.len() => {
                    return Err(RecipeError::InvalidData(format!(
                        "table column `{name}` has {} rows, expected {expected}",
                        column.len()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn columns(&self) -> &IndexMap<String, NdArray> {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&NdArray> {
        self.columns.get(name)
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.values().next().map_or(0, NdArray::len)
    }

    /// Common dtype of all columns, `None` when mixed or empty.
    #[must_use]
    pub fn uniform_dtype(&self) -> Option<DType> {
        let mut dtypes = self.columns.values().map(NdArray::dtype);
        let first = dtypes.next()?;
        dtypes.all(|dtype| dtype == first).then_some(first)
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((ln, lc), (rn, rc))| ln == rn && lc.same_as(rc))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableRepr {
    columns: IndexMap<String, NdArray>,
}

impl From<Table> for TableRepr {
    fn from(table: Table) -> Self {
        Self {
            columns: table.columns,
        }
    }
}

impl TryFrom<TableRepr> for Table {
    type Error = RecipeError;

    fn try_from(repr: TableRepr) -> Result<Self, Self::Error> {
        Table::new(repr.columns)
    }
}

/// One recorded argument value.
///
/// Serialized untagged so recipe documents stay readable: scalars are plain
/// JSON, arrays carry `dtype`/`shape`/`values`, tables carry `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(NdArray),
    Table(Table),
    List(Vec<ArgValue>),
    Map(IndexMap<String, ArgValue>),
}

impl ArgValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Array(array) if array.len() == 1 => array.data().get_f64(0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric sequence view of scalars, numeric arrays and numeric lists.
    #[must_use]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::Int(_) | Self::Float(_) => self.as_f64().map(|value| vec![value]),
            Self::Array(array) => array.to_f64_vec(),
            Self::List(items) => items.iter().map(Self::as_f64).collect(),
            _ => None,
        }
    }

    /// Number of array elements carried by the value (0 for scalars).
    #[must_use]
    pub fn element_count(&self) -> usize {
        match self {
            Self::Array(array) => array.len(),
            Self::Table(table) => table.row_count() * table.columns().len(),
            Self::List(items) => items.iter().map(Self::element_count).sum::<usize>() + items.len(),
            Self::Map(entries) => entries.values().map(Self::element_count).sum(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        match self {
            Self::Float(value) => !value.is_finite(),
            Self::Array(array) => array.data().has_non_finite(),
            Self::Table(table) => table.columns().values().any(|col| col.data().has_non_finite()),
            Self::List(items) => items.iter().any(Self::has_non_finite),
            Self::Map(entries) => entries.values().any(Self::has_non_finite),
            _ => false,
        }
    }

    /// Equality used by fidelity checks: NaN matches NaN.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Array(a), Self::Array(b)) => a.same_as(b),
            (Self::Table(a), Self::Table(b)) => a.same_as(b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
            }
            _ => self == other,
        }
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<f64>> for ArgValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(NdArray::from_f64(values))
    }
}

impl From<NdArray> for ArgValue {
    fn from(array: NdArray) -> Self {
        Self::Array(array)
    }
}

impl From<Table> for ArgValue {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}
