//! Metric Normalization
//!
//! Turns raw, loosely-typed source fields into a table of rounded
//! numeric-or-missing values. Never fails: bad fields become Missing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use valuation_core::{
    FieldError, MetricSet, MetricSpec, RawFields, RawMetricValue, ValuationTable, ValueScale,
};

/// Raw fields for one symbol. `fields` is `None` when the fetch failed.
#[derive(Debug, Clone)]
pub struct EntityFields {
    pub symbol: String,
    pub fields: Option<RawFields>,
}

impl EntityFields {
    pub fn fetched(symbol: impl Into<String>, fields: RawFields) -> Self {
        Self {
            symbol: symbol.into(),
            fields: Some(fields),
        }
    }

    pub fn failed(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            fields: None,
        }
    }
}

/// Round to 2 decimal places, half to even, on the exact decimal value of
/// `value` (2.675 is stored as 2.67499.. and rounds down).
pub fn round2(value: f64) -> f64 {
    Decimal::from_f64_retain(value)
        .and_then(|d| d.round_dp(2).to_f64())
        // Outside Decimal's range two decimals are below f64 precision anyway
        .unwrap_or(value)
}

pub struct MetricNormalizer {
    metrics: MetricSet,
}

impl Default for MetricNormalizer {
    fn default() -> Self {
        Self::new(MetricSet::default())
    }
}

impl MetricNormalizer {
    pub fn new(metrics: MetricSet) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    /// Build the table in input order. A repeated symbol keeps its first row.
    pub fn normalize(&self, inputs: &[EntityFields]) -> ValuationTable {
        let mut table = ValuationTable::new(self.metrics.clone());

        for input in inputs {
            let row = self.normalize_row(&input.symbol, input.fields.as_ref());
            if let Err(e) = table.push_row(&input.symbol, row) {
                tracing::warn!("Skipping row for {}: {}", input.symbol, e);
            }
        }

        table
    }

    /// One value per configured metric; all Missing when `fields` is `None`.
    pub fn normalize_row(&self, symbol: &str, fields: Option<&RawFields>) -> Vec<Option<f64>> {
        let Some(fields) = fields else {
            return vec![None; self.metrics.len()];
        };

        self.metrics
            .iter()
            .map(|spec| match Self::normalize_value(spec, fields.get(spec.key)) {
                Ok(v) => Some(v),
                Err(FieldError::Missing) => None,
                Err(e @ FieldError::Malformed(_)) => {
                    tracing::debug!("{} {} degraded to missing: {}", symbol, spec.key, e);
                    None
                }
            })
            .collect()
    }

    pub fn normalize_value(spec: &MetricSpec, raw: Option<&Value>) -> Result<f64, FieldError> {
        let value = match RawMetricValue::from_json(raw)? {
            RawMetricValue::Number(v) => v,
            RawMetricValue::Missing => return Err(FieldError::Missing),
        };

        let scaled = match spec.scale {
            // Fractions get lifted to percent; percent-scale input passes through
            ValueScale::FractionOrPercent if value > 0.0 && value < 1.0 => value * 100.0,
            _ => value,
        };

        Ok(round2(scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;
    use valuation_core::{Direction, DEFAULT_METRICS};

    fn fields(pairs: &[(&str, Value)]) -> RawFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn dividend_spec() -> MetricSpec {
        DEFAULT_METRICS[4]
    }

    fn pe_spec() -> MetricSpec {
        DEFAULT_METRICS[1]
    }

    #[test]
    fn test_plain_metric_rounds_to_two_decimals() {
        let v = MetricNormalizer::normalize_value(&pe_spec(), Some(&json!(27.13456))).unwrap();
        assert_relative_eq!(v, 27.13);

        let v = MetricNormalizer::normalize_value(&pe_spec(), Some(&json!(0.456))).unwrap();
        assert_relative_eq!(v, 0.46);

        let v = MetricNormalizer::normalize_value(&pe_spec(), Some(&json!(-12.345678))).unwrap();
        assert_relative_eq!(v, -12.35);
    }

    #[test]
    fn test_rounding_matches_decimal_half_even() {
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(1.115), 1.11);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(10.125), 10.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(1e30), 1e30);

        let v = MetricNormalizer::normalize_value(&pe_spec(), Some(&json!(2.675))).unwrap();
        assert_eq!(v, 2.67);
    }

    #[test]
    fn test_dividend_yield_fraction_rescaled() {
        let v = MetricNormalizer::normalize_value(&dividend_spec(), Some(&json!(0.034))).unwrap();
        assert_relative_eq!(v, 3.4);
    }

    #[test]
    fn test_dividend_yield_percent_passes_through() {
        let v = MetricNormalizer::normalize_value(&dividend_spec(), Some(&json!(3.4))).unwrap();
        assert_relative_eq!(v, 3.4);

        let v = MetricNormalizer::normalize_value(&dividend_spec(), Some(&json!(1.0))).unwrap();
        assert_relative_eq!(v, 1.0);

        let v = MetricNormalizer::normalize_value(&dividend_spec(), Some(&json!(0.0))).unwrap();
        assert_relative_eq!(v, 0.0);
    }

    #[test]
    fn test_missing_stays_missing() {
        assert_eq!(
            MetricNormalizer::normalize_value(&dividend_spec(), None),
            Err(FieldError::Missing)
        );
        assert_eq!(
            MetricNormalizer::normalize_value(&pe_spec(), Some(&Value::Null)),
            Err(FieldError::Missing)
        );
    }

    #[test]
    fn test_malformed_degrades_single_cell() {
        let normalizer = MetricNormalizer::default();
        let raw = fields(&[
            ("currentPrice", json!(512.3456)),
            ("trailingPE", json!("Infinity")),
            ("forwardPE", json!(true)),
            ("priceToBook", json!("4.123")),
        ]);

        let row = normalizer.normalize_row("SPY", Some(&raw));
        assert_eq!(row.len(), 8);
        assert_eq!(row[0], Some(512.35));
        assert_eq!(row[1], None);
        assert_eq!(row[2], None);
        assert_eq!(row[3], Some(4.12));
        assert!(row[4..].iter().all(Option::is_none));
    }

    #[test]
    fn test_failed_fetch_yields_full_missing_row() {
        let normalizer = MetricNormalizer::default();
        let inputs = vec![
            EntityFields::fetched("SPY", fields(&[("trailingPE", json!(24.5))])),
            EntityFields::failed("GOOG"),
            EntityFields::fetched("NVDA", fields(&[("trailingPE", json!(60.0))])),
        ];

        let table = normalizer.normalize(&inputs);
        assert_eq!(table.entities(), &["SPY", "GOOG", "NVDA"]);
        assert!(table.row_values(1).iter().all(Option::is_none));
        assert_eq!(table.value(0, 1), Some(24.5));
        assert_eq!(table.value(2, 1), Some(60.0));
    }

    #[test]
    fn test_duplicate_symbol_keeps_first_row() {
        let normalizer = MetricNormalizer::default();
        let inputs = vec![
            EntityFields::fetched("WMT", fields(&[("currentPrice", json!(90.0))])),
            EntityFields::fetched("WMT", fields(&[("currentPrice", json!(1.0))])),
        ];

        let table = normalizer.normalize(&inputs);
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.value(0, 0), Some(90.0));
    }

    #[test]
    fn test_custom_metric_set_order() {
        let metrics = MetricSet::new(vec![
            MetricSpec::new("fiftyTwoWeekHigh", "52W High", Direction::HigherIsBetter),
            MetricSpec::percent("dividendYield", "Yield %", Direction::HigherIsBetter),
        ])
        .unwrap();
        let normalizer = MetricNormalizer::new(metrics);
        let raw = fields(&[("dividendYield", json!(0.0125)), ("fiftyTwoWeekHigh", json!(200.999))]);

        let row = normalizer.normalize_row("TSLA", Some(&raw));
        assert_eq!(row, vec![Some(201.0), Some(1.25)]);
    }
}
