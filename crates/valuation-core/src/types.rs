use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::{FieldError, ValuationError};

/// Marker some sources use in place of a value.
pub const MISSING_MARKER: &str = "-";

/// Raw field name -> raw JSON value, as returned by a data source for one symbol.
pub type RawFields = HashMap<String, Value>;

/// Which end of a metric's range is the good one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// How the source expresses a metric's magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueScale {
    Plain,
    /// Reported either as a fraction (0.034) or already in percent (3.4).
    FractionOrPercent,
}

/// One valuation field: where to read it, what to call it, which way is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub direction: Direction,
    pub scale: ValueScale,
}

impl MetricSpec {
    pub const fn new(key: &'static str, label: &'static str, direction: Direction) -> Self {
        Self {
            key,
            label,
            direction,
            scale: ValueScale::Plain,
        }
    }

    pub const fn percent(key: &'static str, label: &'static str, direction: Direction) -> Self {
        Self {
            key,
            label,
            direction,
            scale: ValueScale::FractionOrPercent,
        }
    }
}

/// Default dashboard columns, in display order.
pub const DEFAULT_METRICS: &[MetricSpec] = &[
    MetricSpec::new("currentPrice", "Last Price", Direction::HigherIsBetter),
    MetricSpec::new("trailingPE", "P/E", Direction::LowerIsBetter),
    MetricSpec::new("forwardPE", "Forward P/E", Direction::LowerIsBetter),
    MetricSpec::new("priceToBook", "Price/Book", Direction::LowerIsBetter),
    MetricSpec::percent("dividendYield", "Dividend Yield", Direction::HigherIsBetter),
    MetricSpec::new("enterpriseToEbitda", "EV/EBITDA", Direction::LowerIsBetter),
    MetricSpec::new("fiftyTwoWeekLow", "52W Low", Direction::HigherIsBetter),
    MetricSpec::new("fiftyTwoWeekHigh", "52W High", Direction::HigherIsBetter),
];

/// Ordered metric columns with unique keys and labels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSet {
    specs: Vec<MetricSpec>,
}

impl MetricSet {
    pub fn new(specs: Vec<MetricSpec>) -> Result<Self, ValuationError> {
        let mut keys = HashSet::new();
        let mut labels = HashSet::new();
        for spec in &specs {
            if !keys.insert(spec.key) {
                return Err(ValuationError::DuplicateMetric(spec.key.to_string()));
            }
            if !labels.insert(spec.label) {
                return Err(ValuationError::DuplicateMetric(spec.label.to_string()));
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.label.to_string()).collect()
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self {
            specs: DEFAULT_METRICS.to_vec(),
        }
    }
}

/// A raw field after type coercion, before rounding/rescaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawMetricValue {
    Number(f64),
    Missing,
}

impl RawMetricValue {
    /// Coerce a raw JSON field. Absent, null, `"-"`, blank text and `{}` are
    /// Missing; numbers, numeric text and `{"raw": ...}` wrappers are numbers.
    pub fn from_json(value: Option<&Value>) -> Result<Self, FieldError> {
        let Some(value) = value else {
            return Ok(Self::Missing);
        };

        match value {
            Value::Null => Ok(Self::Missing),
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Self::Number)
                .ok_or_else(|| FieldError::Malformed(format!("non-finite number {}", n))),
            Value::String(s) => {
                let text = s.trim();
                if text.is_empty() || text == MISSING_MARKER {
                    return Ok(Self::Missing);
                }
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(Self::Number)
                    .ok_or_else(|| FieldError::Malformed(format!("non-numeric text {:?}", text)))
            }
            Value::Object(map) if map.is_empty() => Ok(Self::Missing),
            Value::Object(map) => match map.get("raw") {
                Some(raw) => Self::from_json(Some(raw)),
                None => Err(FieldError::Malformed("object without raw value".to_string())),
            },
            Value::Bool(_) => Err(FieldError::Malformed("boolean".to_string())),
            Value::Array(_) => Err(FieldError::Malformed("array".to_string())),
        }
    }
}

/// One (entity, metric) cell after normalization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCell {
    pub entity: String,
    pub label: String,
    pub value: Option<f64>,
}

/// Entities x metrics, values normalized. Row keys and column labels are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationTable {
    metrics: MetricSet,
    entities: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl ValuationTable {
    pub fn new(metrics: MetricSet) -> Self {
        Self {
            metrics,
            entities: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Rejects a repeated entity or a row of the wrong width.
    pub fn push_row(&mut self, entity: &str, values: Vec<Option<f64>>) -> Result<(), ValuationError> {
        if self.entities.iter().any(|e| e == entity) {
            return Err(ValuationError::DuplicateEntity(entity.to_string()));
        }
        if values.len() != self.metrics.len() {
            return Err(ValuationError::RowWidth {
                symbol: entity.to_string(),
                expected: self.metrics.len(),
                actual: values.len(),
            });
        }
        self.entities.push(entity.to_string());
        self.rows.push(values);
        Ok(())
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_values(&self, row: usize) -> &[Option<f64>] {
        &self.rows[row]
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(col).copied().flatten())
    }

    pub fn column(&self, col: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(col).copied().flatten()).collect()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<NormalizedCell> {
        let entity = self.entities.get(row)?;
        let spec = self.metrics.specs().get(col)?;
        Some(NormalizedCell {
            entity: entity.clone(),
            label: spec.label.to_string(),
            value: self.value(row, col),
        })
    }

    /// True when no row has any value.
    pub fn is_all_missing(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(Option::is_none))
    }
}

/// Background color annotation for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_css(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    pub fn background_style(&self) -> String {
        format!("background-color: {}", self.to_css())
    }
}

/// Per-cell colors, same shape as the table they were computed from
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColorTable {
    cells: Vec<Vec<Option<Rgb>>>,
}

impl ColorTable {
    /// An all-unannotated table of the given shape.
    pub fn blank(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![vec![None; cols]; rows],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Rgb> {
        self.cells.get(row).and_then(|r| r.get(col).copied().flatten())
    }

    pub fn set(&mut self, row: usize, col: usize, color: Option<Rgb>) {
        if let Some(slot) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            *slot = color;
        }
    }

    pub fn num_rows(&self) -> usize {
        self.cells.len()
    }
}

/// A normalized cell with its display color
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCell {
    #[serde(flatten)]
    pub cell: NormalizedCell,
    pub color: Option<Rgb>,
}

/// One exported row: entity id followed by plain values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub entity: String,
    pub values: Vec<Option<f64>>,
}

/// Color-free records handed to an export serializer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecordSet {
    pub index_header: String,
    pub headers: Vec<String>,
    pub rows: Vec<ExportRow>,
}

/// A serialized spreadsheet ready for download
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
    pub generated_at: DateTime<Utc>,
}
