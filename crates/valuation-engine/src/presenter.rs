//! Table presentation: a colored display grid and a color-free export record set.

use serde::Serialize;
use valuation_core::{ColorTable, ExportRecordSet, ExportRow, RankedCell, Rgb, ValuationTable};

/// Rendered in place of a missing value.
pub const MISSING_GLYPH: &str = "-";

/// Header of the entity column in exports.
pub const INDEX_HEADER: &str = "Ticker";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayCell {
    pub text: String,
    pub value: Option<f64>,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub entity: String,
    pub cells: Vec<DisplayCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayGrid {
    pub headers: Vec<String>,
    pub rows: Vec<DisplayRow>,
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => MISSING_GLYPH.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct TablePresenter;

impl TablePresenter {
    pub fn new() -> Self {
        Self
    }

    /// Pair every cell with its color, row-major.
    pub fn ranked_rows(&self, table: &ValuationTable, colors: &ColorTable) -> Vec<Vec<RankedCell>> {
        (0..table.num_rows())
            .map(|row| {
                (0..table.num_cols())
                    .filter_map(|col| {
                        table.cell(row, col).map(|cell| RankedCell {
                            color: cell.value.and(colors.get(row, col)),
                            cell,
                        })
                    })
                    .collect()
            })
            .collect()
    }

    pub fn display_grid(&self, table: &ValuationTable, colors: &ColorTable) -> DisplayGrid {
        let rows = self
            .ranked_rows(table, colors)
            .into_iter()
            .zip(table.entities())
            .map(|(cells, entity)| DisplayRow {
                entity: entity.clone(),
                cells: cells
                    .into_iter()
                    .map(|ranked| DisplayCell {
                        text: format_value(ranked.cell.value),
                        value: ranked.cell.value,
                        color: ranked.color,
                    })
                    .collect(),
            })
            .collect();

        DisplayGrid {
            headers: table.metrics().labels(),
            rows,
        }
    }

    /// Plain rounded values only; colors never reach the export.
    pub fn export_records(&self, table: &ValuationTable) -> ExportRecordSet {
        ExportRecordSet {
            index_header: INDEX_HEADER.to_string(),
            headers: table.metrics().labels(),
            rows: table
                .entities()
                .iter()
                .enumerate()
                .map(|(row, entity)| ExportRow {
                    entity: entity.clone(),
                    values: table.row_values(row).to_vec(),
                })
                .collect(),
        }
    }
}
