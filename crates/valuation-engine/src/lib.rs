//! Valuation Engine
//!
//! Normalizes raw per-symbol valuation fields, ranks each metric across
//! symbols into a red/green gradient, and prepares display and export views.

pub mod cache;
pub mod dashboard;
pub mod export;
pub mod normalizer;
pub mod presenter;
pub mod ranker;

pub use cache::TableCache;
pub use dashboard::{ValuationDashboard, ValuationView};
pub use export::{CsvExporter, XlsxExporter};
pub use normalizer::{EntityFields, MetricNormalizer};
pub use presenter::{DisplayCell, DisplayGrid, DisplayRow, TablePresenter, MISSING_GLYPH};
pub use ranker::{RankColorizer, GRADIENT_BLUE};
