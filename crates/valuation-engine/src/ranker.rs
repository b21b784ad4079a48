//! Cross-sectional Ranking Module
//!
//! Ranks each metric column across symbols and maps the rank onto a
//! red (worst) to green (best) gradient.

use valuation_core::{ColorTable, Direction, Rgb, ValuationTable};

/// Third color channel, constant for every annotated cell.
pub const GRADIENT_BLUE: u8 = 100;

/// Position given to the only present value in a column.
const NEUTRAL_POSITION: f64 = 0.5;

/// 1-based ranks, ascending by value, ties share the average of their ranks.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // Sorted slots start..=end hold ranks start+1..=end+1
        let avg = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = avg;
        }
        start = end + 1;
    }

    ranks
}

/// Rank position in [0, 1] for each present cell; `None` stays `None`.
pub fn rank_positions(column: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<(usize, f64)> = column
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();

    let mut positions = vec![None; column.len()];
    match present.len() {
        0 => {}
        1 => positions[present[0].0] = Some(NEUTRAL_POSITION),
        count => {
            let values: Vec<f64> = present.iter().map(|&(_, v)| v).collect();
            let ranks = average_ranks(&values);
            for (&(idx, _), rank) in present.iter().zip(ranks) {
                positions[idx] = Some((rank - 1.0) / (count - 1) as f64);
            }
        }
    }

    positions
}

/// Map a rank position to a color. Position 1 is the largest raw value.
pub fn gradient(position: f64, direction: Direction) -> Rgb {
    let intensity = (255.0 * position.clamp(0.0, 1.0)).round() as u8;
    match direction {
        Direction::HigherIsBetter => Rgb::new(255 - intensity, intensity, GRADIENT_BLUE),
        Direction::LowerIsBetter => Rgb::new(intensity, 255 - intensity, GRADIENT_BLUE),
    }
}

/// Colors every present cell of a table by its rank within its column
#[derive(Debug, Default, Clone, Copy)]
pub struct RankColorizer;

impl RankColorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn colorize_column(&self, column: &[Option<f64>], direction: Direction) -> Vec<Option<Rgb>> {
        rank_positions(column)
            .into_iter()
            .map(|pos| pos.map(|p| gradient(p, direction)))
            .collect()
    }

    /// Compute the full (row, column) color table. The input is not modified.
    pub fn colorize(&self, table: &ValuationTable) -> ColorTable {
        let mut colors = ColorTable::blank(table.num_rows(), table.num_cols());

        for (col, spec) in table.metrics().iter().enumerate() {
            let column = table.column(col);
            if column.iter().all(Option::is_none) {
                tracing::debug!("Column {} has no values, skipping ranking", spec.label);
                continue;
            }

            for (row, color) in self.colorize_column(&column, spec.direction).into_iter().enumerate() {
                colors.set(row, col, color);
            }
        }

        colors
    }
}
