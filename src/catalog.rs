use std::io::{Read, Write};

use camino::Utf8Path;

use crate::domain::{TicId, ToiId, ToiNumber};
use crate::error::AtlasError;
use crate::store::Store;

pub const COL_TIC_ID: &str = "TIC ID";
pub const COL_TOI: &str = "TOI";
pub const COL_PERIOD: &str = "Period (days)";
pub const COL_EPOCH: &str = "Epoch (BJD)";
pub const COL_DURATION: &str = "Duration (hours)";
pub const COL_DEPTH: &str = "Depth (ppm)";
pub const COL_SNR: &str = "Planet SNR";
pub const COL_TOI_INT: &str = "TOI int";
pub const COL_PLANET_COUNT: &str = "planet count";
pub const COL_MULTIPLANET: &str = "Multiplanet System";
pub const COL_SINGLE_TRANSIT: &str = "Single Transit";
pub const COL_LIGHTCURVE_AVAILABLE: &str = "Lightcurve Available";

/// Column-named, row-ordered snapshot of the TOI catalog.
///
/// Cells are kept as the strings read from CSV so that columns the crate
/// never interprets survive a load/persist cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CatalogTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AtlasError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let columns = reader
            .headers()
            .map_err(|err| AtlasError::CatalogParse(err.to_string()))?
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| AtlasError::CatalogParse(err.to_string()))?;
            rows.push(record.iter().map(|value| value.to_string()).collect());
        }
        Ok(Self { columns, rows })
    }

    pub fn from_csv_str(content: &str) -> Result<Self, AtlasError> {
        Self::from_reader(content.as_bytes())
    }

    pub fn read_csv(path: &Utf8Path) -> Result<Self, AtlasError> {
        let file = std::fs::File::open(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(format!("open {path}: {err}")))?;
        Self::from_reader(file)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), AtlasError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.columns)
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, AtlasError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn write_csv(&self, path: &Utf8Path) -> Result<(), AtlasError> {
        Store::write_bytes_atomic(path, &self.to_csv_bytes()?)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, AtlasError> {
        self.column_index(name)
            .ok_or_else(|| AtlasError::MissingColumn(name.to_string()))
    }

    pub fn rows(&self) -> impl Iterator<Item = CatalogRow<'_>> {
        self.rows.iter().map(move |values| CatalogRow {
            table: self,
            values,
        })
    }

    pub fn row(&self, index: usize) -> Option<CatalogRow<'_>> {
        self.rows.get(index).map(|values| CatalogRow {
            table: self,
            values,
        })
    }

    pub fn first(&self) -> Option<CatalogRow<'_>> {
        self.row(0)
    }

    /// Sets `name` on every row, appending the column if it is new.
    pub fn set_column<I>(&mut self, name: &str, values: I) -> Result<(), AtlasError>
    where
        I: IntoIterator<Item = String>,
    {
        let values = values.into_iter().collect::<Vec<_>>();
        if values.len() != self.rows.len() {
            return Err(AtlasError::CatalogParse(format!(
                "column {name:?} has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Rows for which `keep` holds, in their original order.
    pub fn filter<F>(&self, mut keep: F) -> CatalogTable
    where
        F: FnMut(&CatalogRow<'_>) -> bool,
    {
        let rows = self
            .rows()
            .filter(|row| keep(row))
            .map(|row| row.values.to_vec())
            .collect();
        CatalogTable {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Stable sort by candidate id; unparsable ids sort last.
    pub fn sorted_by_toi(&self) -> CatalogTable {
        let mut keyed = self
            .rows()
            .map(|row| (row.toi_id().ok(), row.values.to_vec()))
            .collect::<Vec<_>>();
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        CatalogTable {
            columns: self.columns.clone(),
            rows: keyed.into_iter().map(|(_, values)| values).collect(),
        }
    }

    /// Appends `other`'s rows; both tables must share the same columns.
    pub fn extend(&mut self, other: &CatalogTable) -> Result<(), AtlasError> {
        if self.columns.is_empty() && self.rows.is_empty() {
            self.columns = other.columns.clone();
        }
        if self.columns != other.columns {
            return Err(AtlasError::CatalogParse(
                "cannot concatenate tables with different columns".to_string(),
            ));
        }
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogRow<'a> {
    table: &'a CatalogTable,
    values: &'a [String],
}

impl<'a> CatalogRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column_index(column)
            .and_then(|index| self.values.get(index))
            .map(|value| value.as_str())
    }

    /// Numeric cell; empty and non-finite cells read as `None`.
    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn flag(&self, column: &str) -> bool {
        self.get(column).map(parse_flag).unwrap_or(false)
    }

    pub fn toi_id(&self) -> Result<ToiId, AtlasError> {
        let value = self
            .get(COL_TOI)
            .ok_or_else(|| AtlasError::MissingColumn(COL_TOI.to_string()))?;
        value.parse()
    }

    pub fn toi_number(&self) -> Result<ToiNumber, AtlasError> {
        self.toi_id().map(ToiId::number)
    }

    pub fn tic_id(&self) -> Result<TicId, AtlasError> {
        let value = self
            .get(COL_TIC_ID)
            .ok_or_else(|| AtlasError::MissingColumn(COL_TIC_ID.to_string()))?;
        value.parse()
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }
}

pub fn format_flag(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
