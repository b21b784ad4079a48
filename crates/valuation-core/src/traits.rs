use async_trait::async_trait;
use crate::{ExportRecordSet, RawFields, ValuationError};

/// Source of raw per-symbol fundamentals fields
#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    async fn fetch_fields(&self, symbol: &str) -> Result<RawFields, ValuationError>;
}

/// Turns plain export records into a downloadable spreadsheet
pub trait ExportSerializer: Send + Sync {
    fn mime_type(&self) -> &'static str;

    fn file_name(&self) -> String;

    fn serialize(&self, records: &ExportRecordSet) -> Result<Vec<u8>, ValuationError>;
}
