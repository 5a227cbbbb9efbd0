use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::ElementId;
use crate::error::{RecipeError, RecipeResult};
use crate::recipe::value::{ArgValue, ArrayData, DType, NdArray, Table};

/// Arrays longer than this are written to external files.
pub const DEFAULT_INLINE_THRESHOLD: usize = 64;

/// `dtype` recorded for tables whose columns do not share one type.
pub const MIXED_DTYPE: &str = "mixed";

const BINARY_MAGIC: &[u8; 4] = b"FRB1";
const BINARY_ARRAY: u8 = 0;
const BINARY_TABLE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Columnar text (`.csv`), one value per line.
    Table,
    /// Self-describing little-endian container (`.frb`).
    Binary,
}

/// Pointer from a recipe to bulk data stored next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalDataRef {
    pub kind: StorageKind,
    /// Relative to the directory holding the recipe document.
    pub path: PathBuf,
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Inline,
    Bulk,
}

/// Splits small metadata from bulk payloads.
///
/// Tables are always bulk. Arrays are bulk above `threshold` elements or
/// when they contain NaN/inf, which the JSON document cannot carry.
/// Lists and maps stay inline at any length: they hold heterogeneous
/// metadata with no columnar form, and capture already rejects non-finite
/// scalars inside them. Homogeneous numeric data arrives as an array.
#[must_use]
pub fn classify(value: &ArgValue, threshold: usize) -> Classification {
    match value {
        ArgValue::Table(_) => Classification::Bulk,
        ArgValue::Array(array) if array.len() > threshold || array.data().has_non_finite() => {
            Classification::Bulk
        }
        _ => Classification::Inline,
    }
}

/// Writes bulk arguments under `<base_dir>/<data_dir>` and verifies each
/// file by reading it back.
#[derive(Debug, Clone)]
pub struct DataExternalizer {
    base_dir: PathBuf,
    data_dir: PathBuf,
    threshold: usize,
    written: Vec<PathBuf>,
}

impl DataExternalizer {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            data_dir: data_dir.into(),
            threshold: DEFAULT_INLINE_THRESHOLD,
            written: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Relative paths of every file written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    #[must_use]
    pub fn classify(&self, value: &ArgValue) -> Classification {
        classify(value, self.threshold)
    }

    pub fn externalize(
        &mut self,
        element_id: &ElementId,
        argument: &str,
        value: &ArgValue,
    ) -> RecipeResult<ExternalDataRef> {
        let fidelity = |reason: String| RecipeError::DataFidelity {
            element_id: element_id.to_string(),
            argument: argument.to_owned(),
            reason,
        };

        let (kind, shape, dtype, columns, bytes) = match value {
            ArgValue::Array(array) if array.ndim() == 1 => (
                StorageKind::Table,
                array.shape().to_vec(),
                array.dtype().name().to_owned(),
                None,
                encode_csv_array(array.data()).into_bytes(),
            ),
            ArgValue::Array(array) => (
                StorageKind::Binary,
                array.shape().to_vec(),
                array.dtype().name().to_owned(),
                None,
                encode_binary_array(array),
            ),
            ArgValue::Table(table) => {
                let names: Vec<String> = table.columns().keys().cloned().collect();
                let shape = vec![table.row_count(), names.len()];
                match table.uniform_dtype() {
                    Some(dtype) => (
                        StorageKind::Table,
                        shape,
                        dtype.name().to_owned(),
                        Some(names),
                        encode_csv_table(table).into_bytes(),
                    ),
                    None => (
                        StorageKind::Binary,
                        shape,
                        MIXED_DTYPE.to_owned(),
                        Some(names),
                        encode_binary_table(table),
                    ),
                }
            }
            _ => return Err(fidelity("only arrays and tables can be externalized".to_owned())),
        };

        let extension = match kind {
            StorageKind::Table => "csv",
            StorageKind::Binary => "frb",
        };
        let absolute_dir = self.base_dir.join(&self.data_dir);
        fs::create_dir_all(&absolute_dir).map_err(|err| RecipeError::io(&absolute_dir, err))?;
        let file_name = fresh_file_name(
            &absolute_dir,
            &format!("{}_{}", sanitize(element_id.as_str()), sanitize(argument)),
            extension,
        );
        let absolute = absolute_dir.join(&file_name);
        fs::write(&absolute, &bytes).map_err(|err| RecipeError::io(&absolute, err))?;

        let data_ref = ExternalDataRef {
            kind,
            path: self.data_dir.join(&file_name),
            shape,
            dtype,
            columns,
        };
        let restored = inline_materialize(&self.base_dir, element_id, argument, &data_ref)
            .map_err(|err| fidelity(format!("read-back failed: {err}")))?;
        if !restored.same_as(value) {
            return Err(fidelity(format!(
                "read-back of `{}` differs from the recorded value",
                data_ref.path.display()
            )));
        }

        debug!(
            element_id = %element_id,
            argument,
            path = %data_ref.path.display(),
            bytes = bytes.len(),
            "externalized bulk argument"
        );
        self.written.push(data_ref.path.clone());
        Ok(data_ref)
    }
}

/// Reads an external reference back into an argument value.
///
/// Any failure (missing file, unreadable content, shape or dtype not
/// matching the reference) is a `BrokenDataRef` naming the argument.
pub fn inline_materialize(
    base_dir: &Path,
    element_id: &ElementId,
    argument: &str,
    data_ref: &ExternalDataRef,
) -> RecipeResult<ArgValue> {
    let path = base_dir.join(&data_ref.path);
    let broken = |reason: String| RecipeError::BrokenDataRef {
        element_id: element_id.to_string(),
        argument: argument.to_owned(),
        path: path.clone(),
        reason,
    };

    let bytes = fs::read(&path).map_err(|err| broken(err.to_string()))?;
    trace!(path = %path.display(), bytes = bytes.len(), "materializing external data");
    let value = match data_ref.kind {
        StorageKind::Table => {
            let text = String::from_utf8(bytes).map_err(|err| broken(err.to_string()))?;
            let dtype = DType::from_name(&data_ref.dtype)
                .ok_or_else(|| broken(format!("unknown dtype `{}`", data_ref.dtype)))?;
            match &data_ref.columns {
                None => ArgValue::Array(decode_csv_array(&text, dtype).map_err(broken)?),
                Some(columns) => {
                    ArgValue::Table(decode_csv_table(&text, dtype, columns).map_err(broken)?)
                }
            }
        }
        StorageKind::Binary => decode_binary(&bytes).map_err(broken)?,
    };

    let (shape, dtype) = match &value {
        ArgValue::Array(array) => (array.shape().to_vec(), array.dtype().name().to_owned()),
        ArgValue::Table(table) => (
            vec![table.row_count(), table.columns().len()],
            table
                .uniform_dtype()
                .map_or_else(|| MIXED_DTYPE.to_owned(), |dtype| dtype.name().to_owned()),
        ),
        _ => return Err(broken("unexpected payload".to_owned())),
    };
    if shape != data_ref.shape || dtype != data_ref.dtype {
        return Err(broken(format!(
            "file holds {dtype}{shape:?}, reference declares {}{:?}",
            data_ref.dtype, data_ref.shape
        )));
    }
    Ok(value)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Never reuses a name: `stem.ext`, then `stem_1.ext`, `stem_2.ext`, ...
fn fresh_file_name(dir: &Path, stem: &str, extension: &str) -> String {
    let mut candidate = format!("{stem}.{extension}");
    let mut suffix = 1_u32;
    while dir.join(&candidate).exists() {
        candidate = format!("{stem}_{suffix}.{extension}");
        suffix += 1;
    }
    candidate
}

fn format_cell(data: &ArrayData, index: usize, out: &mut String) {
    match data {
        ArrayData::Float64(values) => out.push_str(&format!("{:?}", values[index])),
        ArrayData::Int64(values) => out.push_str(&values[index].to_string()),
        ArrayData::Bool(values) => out.push_str(&values[index].to_string()),
        ArrayData::Str(values) => push_quoted(&values[index], out),
    }
}

fn push_quoted(field: &str, out: &mut String) {
    let needs_quotes = field.is_empty()
        || field
            .chars()
            .any(|ch| matches!(ch, ',' | '"' | '\n' | '\r'));
    if needs_quotes {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn encode_csv_array(data: &ArrayData) -> String {
    let mut out = String::new();
    for index in 0..data.len() {
        format_cell(data, index, &mut out);
        out.push('\n');
    }
    out
}

fn encode_csv_table(table: &Table) -> String {
    let mut out = String::new();
    for (position, name) in table.columns().keys().enumerate() {
        if position > 0 {
            out.push(',');
        }
        push_quoted(name, &mut out);
    }
    out.push('\n');
    for row in 0..table.row_count() {
        for (position, column) in table.columns().values().enumerate() {
            if position > 0 {
                out.push(',');
            }
            format_cell(column.data(), row, &mut out);
        }
        out.push('\n');
    }
    out
}

/// RFC 4180 record parser; every record ends with a newline.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut dirty = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match ch {
            '"' => {
                in_quotes = true;
                dirty = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                dirty = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                dirty = false;
            }
            other => {
                field.push(other);
                dirty = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_owned());
    }
    if dirty {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn parse_column(cells: Vec<String>, dtype: DType) -> Result<ArrayData, String> {
    let bad = |row: usize, cell: &str| format!("row {row}: `{cell}` is not a valid {dtype}");
    Ok(match dtype {
        DType::Float64 => ArrayData::Float64(
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| cell.parse::<f64>().map_err(|_| bad(row, cell)))
                .collect::<Result<_, _>>()?,
        ),
        DType::Int64 => ArrayData::Int64(
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| cell.parse::<i64>().map_err(|_| bad(row, cell)))
                .collect::<Result<_, _>>()?,
        ),
        DType::Bool => ArrayData::Bool(
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| cell.parse::<bool>().map_err(|_| bad(row, cell)))
                .collect::<Result<_, _>>()?,
        ),
        DType::Str => ArrayData::Str(cells),
    })
}

fn decode_csv_array(text: &str, dtype: DType) -> Result<NdArray, String> {
    let mut cells = Vec::new();
    for (row, mut record) in parse_csv(text)?.into_iter().enumerate() {
        if record.len() != 1 {
            return Err(format!("row {row} has {} fields, expected 1", record.len()));
        }
        cells.push(record.remove(0));
    }
    let data = parse_column(cells, dtype)?;
    let len = data.len();
    NdArray::new(vec![len], data).map_err(|err| err.to_string())
}

fn decode_csv_table(text: &str, dtype: DType, columns: &[String]) -> Result<Table, String> {
    if columns.is_empty() {
        return Table::new(IndexMap::new()).map_err(|err| err.to_string());
    }
    let mut records = parse_csv(text)?.into_iter();
    let header = records.next().ok_or_else(|| "missing header row".to_owned())?;
    if header != columns {
        return Err(format!("header {header:?} does not match columns {columns:?}"));
    }
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for (row, record) in records.enumerate() {
        if record.len() != columns.len() {
            return Err(format!(
                "row {row} has {} fields, expected {}",
                record.len(),
                columns.len()
            ));
        }
        for (column, cell) in cells.iter_mut().zip(record) {
            column.push(cell);
        }
    }
    let mut out = IndexMap::with_capacity(columns.len());
    for (name, column) in columns.iter().zip(cells) {
        let data = parse_column(column, dtype)?;
        let len = data.len();
        out.insert(
            name.clone(),
            NdArray::new(vec![len], data).map_err(|err| err.to_string())?,
        );
    }
    Table::new(out).map_err(|err| err.to_string())
}

fn dtype_code(dtype: DType) -> u8 {
    match dtype {
        DType::Float64 => 0,
        DType::Int64 => 1,
        DType::Bool => 2,
        DType::Str => 3,
    }
}

fn dtype_from_code(code: u8) -> Result<DType, String> {
    match code {
        0 => Ok(DType::Float64),
        1 => Ok(DType::Int64),
        2 => Ok(DType::Bool),
        3 => Ok(DType::Str),
        other => Err(format!("unknown dtype code {other}")),
    }
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

fn put_data(out: &mut Vec<u8>, data: &ArrayData) {
    match data {
        ArrayData::Float64(values) => {
            for value in values {
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
        }
        ArrayData::Int64(values) => {
            for value in values {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        ArrayData::Bool(values) => out.extend(values.iter().map(|value| u8::from(*value))),
        ArrayData::Str(values) => {
            for value in values {
                put_str(out, value);
            }
        }
    }
}

fn encode_binary_array(array: &NdArray) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + array.len() * 8);
    out.extend_from_slice(BINARY_MAGIC);
    out.push(BINARY_ARRAY);
    out.push(dtype_code(array.dtype()));
    out.extend_from_slice(&(array.ndim() as u32).to_le_bytes());
    for dim in array.shape() {
        out.extend_from_slice(&(*dim as u64).to_le_bytes());
    }
    put_data(&mut out, array.data());
    out
}

fn encode_binary_table(table: &Table) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(BINARY_MAGIC);
    out.push(BINARY_TABLE);
    out.extend_from_slice(&(table.columns().len() as u32).to_le_bytes());
    out.extend_from_slice(&(table.row_count() as u64).to_le_bytes());
    for (name, column) in table.columns() {
        put_str(&mut out, name);
        out.push(dtype_code(column.dtype()));
    }
    for column in table.columns().values() {
        put_data(&mut out, column.data());
    }
    out
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], String> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| format!("truncated container at byte {}", self.offset))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, String> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<usize, String> {
        let value = self.array().map(u64::from_le_bytes)?;
        usize::try_from(value).map_err(|_| format!("length {value} does not fit in memory"))
    }

    fn string(&mut self) -> Result<String, String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|err| err.to_string())
    }

    fn data(&mut self, dtype: DType, count: usize) -> Result<ArrayData, String> {
        Ok(match dtype {
            DType::Float64 => ArrayData::Float64(
                (0..count)
                    .map(|_| self.array().map(|raw| f64::from_bits(u64::from_le_bytes(raw))))
                    .collect::<Result<_, _>>()?,
            ),
            DType::Int64 => ArrayData::Int64(
                (0..count)
                    .map(|_| self.array().map(i64::from_le_bytes))
                    .collect::<Result<_, _>>()?,
            ),
            DType::Bool => ArrayData::Bool(
                (0..count)
                    .map(|_| self.u8().map(|raw| raw != 0))
                    .collect::<Result<_, _>>()?,
            ),
            DType::Str => ArrayData::Str(
                (0..count)
                    .map(|_| self.string())
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn decode_binary(bytes: &[u8]) -> Result<ArgValue, String> {
    let mut reader = ByteReader { bytes, offset: 0 };
    if reader.take(4)? != BINARY_MAGIC {
        return Err("not a binary array container".to_owned());
    }
    let value = match reader.u8()? {
        BINARY_ARRAY => {
            let dtype = dtype_from_code(reader.u8()?)?;
            let ndim = reader.u32()? as usize;
            let shape = (0..ndim)
                .map(|_| reader.u64())
                .collect::<Result<Vec<_>, _>>()?;
            let count = shape
                .iter()
                .try_fold(1_usize, |acc, dim| acc.checked_mul(*dim))
                .ok_or_else(|| "shape overflows".to_owned())?;
            let data = reader.data(dtype, count)?;
            ArgValue::Array(NdArray::new(shape, data).map_err(|err| err.to_string())?)
        }
        BINARY_TABLE => {
            let ncolumns = reader.u32()? as usize;
            let rows = reader.u64()?;
            let header = (0..ncolumns)
                .map(|_| -> Result<(String, DType), String> {
                    Ok((reader.string()?, dtype_from_code(reader.u8()?)?))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut columns = IndexMap::with_capacity(ncolumns);
            for (name, dtype) in header {
                let data = reader.data(dtype, rows)?;
                let column = NdArray::new(vec![rows], data).map_err(|err| err.to_string())?;
                columns.insert(name, column);
            }
            ArgValue::Table(Table::new(columns).map_err(|err| err.to_string())?)
        }
        other => return Err(format!("unknown container layout {other}")),
    };
    if reader.offset != bytes.len() {
        return Err(format!(
            "{} trailing bytes after payload",
            bytes.len() - reader.offset
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{
        Classification, DataExternalizer, StorageKind, classify, inline_materialize, parse_csv,
    };
    use crate::core::ElementId;
    use crate::error::RecipeError;
    use crate::recipe::value::{ArgValue, ArrayData, NdArray, Table};

    #[test]
    fn classification_follows_threshold_and_non_finite_values() {
        assert_eq!(classify(&ArgValue::from(vec![1.0; 4]), 4), Classification::Inline);
        assert_eq!(classify(&ArgValue::from(vec![1.0; 5]), 4), Classification::Bulk);
        assert_eq!(classify(&ArgValue::from(vec![f64::NAN]), 4), Classification::Bulk);
        assert_eq!(classify(&ArgValue::from("label"), 0), Classification::Inline);
        let labels = ArgValue::List((0..10).map(|i| ArgValue::from(i64::from(i))).collect());
        assert_eq!(classify(&labels, 4), Classification::Inline);
    }

    #[test]
    fn csv_parser_handles_quotes_and_empty_fields() {
        let records = parse_csv("\"a,b\"\n\"\"\n\"say \"\"hi\"\"\"\n").expect("parse");
        assert_eq!(records, vec![vec!["a,b"], vec![""], vec!["say \"hi\""]]);
    }

    #[test]
    fn string_columns_and_mixed_tables_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut externalizer = DataExternalizer::new(dir.path(), "fig_data");
        let id = ElementId::new("bar_000");

        let labels = ArgValue::Array(NdArray::from_strings(vec![
            "north, east".to_owned(),
            String::new(),
            "line\nbreak".to_owned(),
        ]));
        let data_ref = externalizer.externalize(&id, "x", &labels).expect("labels");
        assert_eq!(data_ref.kind, StorageKind::Table);
        let back = inline_materialize(dir.path(), &id, "x", &data_ref).expect("read back");
        assert!(back.same_as(&labels));

        let mut columns = IndexMap::new();
        columns.insert("x".to_owned(), NdArray::from_f64(vec![0.5, f64::NAN]));
        let flags = NdArray::new(vec![2], ArrayData::Bool(vec![true, false])).expect("flags");
        columns.insert("flag".to_owned(), flags);
        let table = ArgValue::Table(Table::new(columns).expect("table"));
        let data_ref = externalizer.externalize(&id, "data", &table).expect("table");
        assert_eq!(data_ref.kind, StorageKind::Binary);
        assert_eq!(data_ref.dtype, "mixed");
        let back = inline_materialize(dir.path(), &id, "data", &data_ref).expect("read back");
        assert!(back.same_as(&table));
    }

    #[test]
    fn repeated_externalization_never_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut externalizer = DataExternalizer::new(dir.path(), "d").with_threshold(1);
        let id = ElementId::new("plot_000");
        let first = externalizer
            .externalize(&id, "x", &ArgValue::from(vec![1.0, 2.0]))
            .expect("first");
        let second = externalizer
            .externalize(&id, "x", &ArgValue::from(vec![3.0, 4.0]))
            .expect("second");
        assert_ne!(first.path, second.path);
        let back = inline_materialize(dir.path(), &id, "x", &first).expect("first still intact");
        assert!(back.same_as(&ArgValue::from(vec![1.0, 2.0])));
    }

    #[test]
    fn missing_file_is_a_broken_reference_naming_the_argument() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut externalizer = DataExternalizer::new(dir.path(), "d");
        let id = ElementId::new("imshow_000");
        let image = NdArray::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).expect("rows");
        let data_ref = externalizer
            .externalize(&id, "X", &ArgValue::Array(image))
            .expect("externalize");
        std::fs::remove_file(dir.path().join(&data_ref.path)).expect("remove");

        let err = inline_materialize(dir.path(), &id, "X", &data_ref).expect_err("broken");
        match err {
            RecipeError::BrokenDataRef {
                element_id,
                argument,
                ..
            } => {
                assert_eq!(element_id, "imshow_000");
                assert_eq!(argument, "X");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
