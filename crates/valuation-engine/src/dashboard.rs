//! Fetch -> normalize -> rank -> present pipeline with a table cache.

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use valuation_core::{
    ExportArtifact, ExportRecordSet, ExportSerializer, FundamentalsSource, MetricSet,
    ValuationError, ValuationTable,
};

use crate::cache::TableCache;
use crate::normalizer::{EntityFields, MetricNormalizer};
use crate::presenter::{DisplayGrid, TablePresenter};
use crate::ranker::RankColorizer;

/// Everything one render pass produces. Colors live only in `grid`.
#[derive(Debug, Clone)]
pub struct ValuationView {
    pub table: Arc<ValuationTable>,
    pub grid: DisplayGrid,
    pub export: ExportRecordSet,
}

pub struct ValuationDashboard {
    source: Arc<dyn FundamentalsSource>,
    normalizer: MetricNormalizer,
    colorizer: RankColorizer,
    presenter: TablePresenter,
    cache: TableCache,
}

impl ValuationDashboard {
    pub fn new(source: Arc<dyn FundamentalsSource>) -> Self {
        Self {
            source,
            normalizer: MetricNormalizer::default(),
            colorizer: RankColorizer::new(),
            presenter: TablePresenter::new(),
            cache: TableCache::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricSet) -> Self {
        self.normalizer = MetricNormalizer::new(metrics);
        self.cache.clear();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = TableCache::new(ttl);
        self
    }

    pub fn metrics(&self) -> &MetricSet {
        self.normalizer.metrics()
    }

    /// Fetch every symbol concurrently. Output order matches `symbols`;
    /// a failed fetch becomes an empty entry instead of an error.
    pub async fn fetch_all(&self, symbols: &[String]) -> Vec<EntityFields> {
        let fetches = symbols.iter().map(|symbol| async move {
            match self.source.fetch_fields(symbol).await {
                Ok(fields) => EntityFields::fetched(symbol.clone(), fields),
                Err(e) => {
                    let err = ValuationError::EntityFetchFailed {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                    EntityFields::failed(symbol.clone())
                }
            }
        });

        join_all(fetches).await
    }

    /// Cached table for this symbol list, or a freshly fetched one.
    pub async fn load_table(&self, symbols: &[String]) -> Arc<ValuationTable> {
        if let Some(table) = self.cache.get(symbols) {
            tracing::debug!("Valuation cache hit for {}", TableCache::key(symbols));
            return table;
        }

        let inputs = self.fetch_all(symbols).await;
        let failed = inputs.iter().filter(|e| e.fields.is_none()).count();
        let table = Arc::new(self.normalizer.normalize(&inputs));

        if !inputs.is_empty() && failed == inputs.len() {
            // Still rendered (all Missing) but not cached, so the next pass retries
            tracing::error!("Data source unavailable for all {} symbols", failed);
            return table;
        }

        tracing::info!(
            "Built valuation table: {} symbols, {} metrics, {} fetch failures",
            table.num_rows(),
            table.num_cols(),
            failed
        );
        self.cache.insert(symbols, Arc::clone(&table));
        table
    }

    /// Colorize and lay out a table. Colors are recomputed on every call.
    pub fn view(&self, table: Arc<ValuationTable>) -> ValuationView {
        let colors = self.colorizer.colorize(&table);
        let grid = self.presenter.display_grid(&table, &colors);
        let export = self.presenter.export_records(&table);
        ValuationView { table, grid, export }
    }

    pub async fn render(&self, symbols: &[String]) -> ValuationView {
        let table = self.load_table(symbols).await;
        self.view(table)
    }

    pub async fn export(
        &self,
        symbols: &[String],
        serializer: &dyn ExportSerializer,
    ) -> Result<ExportArtifact, ValuationError> {
        let table = self.load_table(symbols).await;
        let records = self.presenter.export_records(&table);
        let bytes = serializer.serialize(&records)?;

        Ok(ExportArtifact {
            bytes,
            mime_type: serializer.mime_type(),
            file_name: serializer.file_name(),
            generated_at: Utc::now(),
        })
    }

    /// Drop the cached table for this symbol list.
    pub fn refresh(&self, symbols: &[String]) -> bool {
        let removed = self.cache.invalidate(symbols);
        tracing::info!("Valuation cache refresh for {} (entry existed: {})", TableCache::key(symbols), removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvExporter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valuation_core::{RawFields, Rgb};

    struct FakeSource {
        data: HashMap<String, RawFields>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            let mut data = HashMap::new();
            data.insert(
                "SPY".to_string(),
                raw(&[("currentPrice", json!(512.3456)), ("trailingPE", json!(24.1)), ("dividendYield", json!(0.0132))]),
            );
            data.insert(
                "NVDA".to_string(),
                raw(&[("currentPrice", json!(120.0)), ("trailingPE", json!(60.5)), ("dividendYield", json!(0.0003))]),
            );
            data.insert(
                "WMT".to_string(),
                raw(&[("currentPrice", json!(90.1)), ("trailingPE", json!(38.4)), ("dividendYield", json!(1.05))]),
            );
            Self {
                data,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn raw(pairs: &[(&str, serde_json::Value)]) -> RawFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[async_trait]
    impl FundamentalsSource for FakeSource {
        async fn fetch_fields(&self, symbol: &str) -> Result<RawFields, ValuationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.data
                .get(symbol)
                .cloned()
                .ok_or_else(|| ValuationError::NotFound(symbol.to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_symbol_gets_missing_row_others_unaffected() {
        let source = Arc::new(FakeSource::new());
        let dashboard = ValuationDashboard::new(source.clone());

        let view = dashboard.render(&symbols(&["SPY", "BROKEN", "NVDA"])).await;

        assert_eq!(view.table.entities(), &["SPY", "BROKEN", "NVDA"]);
        assert!(view.table.row_values(1).iter().all(Option::is_none));
        assert_eq!(view.table.value(0, 0), Some(512.35));
        assert_eq!(view.table.value(2, 1), Some(60.5));
        assert!(view.grid.rows[1].cells.iter().all(|c| c.text == "-" && c.color.is_none()));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_source_and_matches_miss() {
        let source = Arc::new(FakeSource::new());
        let dashboard = ValuationDashboard::new(source.clone());
        let list = symbols(&["SPY", "NVDA", "WMT"]);

        let first = dashboard.load_table(&list).await;
        assert_eq!(source.calls(), 3);

        let second = dashboard.load_table(&list).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(*first, *second);

        assert!(dashboard.refresh(&list));
        let third = dashboard.load_table(&list).await;
        assert_eq!(source.calls(), 6);
        assert_eq!(*first, *third);
    }

    #[tokio::test]
    async fn test_total_failure_renders_and_is_not_cached() {
        let source = Arc::new(FakeSource::new());
        let dashboard = ValuationDashboard::new(source.clone());
        let list = symbols(&["AAA", "BBB"]);

        let view = dashboard.render(&list).await;
        assert_eq!(view.table.num_rows(), 2);
        assert!(view.table.is_all_missing());
        assert!(view.grid.rows.iter().flat_map(|r| &r.cells).all(|c| c.color.is_none()));

        dashboard.render(&list).await;
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_render_colors_and_rescales() {
        let dashboard = ValuationDashboard::new(Arc::new(FakeSource::new()));
        let view = dashboard.render(&symbols(&["SPY", "NVDA", "WMT"])).await;

        // Dividend yield: 1.32, 0.03, 1.05
        assert_eq!(view.table.value(0, 4), Some(1.32));
        assert_eq!(view.table.value(1, 4), Some(0.03));
        assert_eq!(view.table.value(2, 4), Some(1.05));

        // P/E is lower-is-better: SPY (24.1) best, NVDA (60.5) worst
        assert_eq!(view.grid.rows[0].cells[1].color, Some(Rgb::new(0, 255, 100)));
        assert_eq!(view.grid.rows[1].cells[1].color, Some(Rgb::new(255, 0, 100)));
        assert_eq!(view.grid.rows[2].cells[1].color, Some(Rgb::new(128, 127, 100)));

        // Forward P/E has no values anywhere
        assert!(view.grid.rows.iter().all(|r| r.cells[2].color.is_none()));
    }

    #[tokio::test]
    async fn test_export_artifact_matches_grid() {
        let dashboard = ValuationDashboard::new(Arc::new(FakeSource::new()));
        let list = symbols(&["SPY", "WMT"]);

        let view = dashboard.render(&list).await;
        let artifact = dashboard.export(&list, &CsvExporter::default()).await.unwrap();

        assert_eq!(artifact.mime_type, "text/csv");
        assert_eq!(artifact.file_name, "valuation_data.csv");

        let text = String::from_utf8(artifact.bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Ticker,Last Price,P/E,Forward P/E,Price/Book,Dividend Yield,EV/EBITDA,52W Low,52W High")
        );
        assert_eq!(lines.next(), Some("SPY,512.35,24.1,,,1.32,,,"));
        assert_eq!(lines.next(), Some("WMT,90.1,38.4,,,1.05,,,"));
        assert_eq!(view.grid.rows[0].cells[0].text, "512.35");
        assert!(!text.contains("rgb"));
    }
}
