//! Spreadsheet export: an xlsx workbook by default, CSV as the plain-text
//! alternative. Both write a `Ticker` column followed by one column per metric
//! label and leave Missing values blank.

use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet, XlsxError};
use valuation_core::{ExportRecordSet, ExportSerializer, ValuationError};

pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_MIME_TYPE: &str = "text/csv";

const DEFAULT_FILE_STEM: &str = "valuation_data";

/// Writes export records into a single-sheet Office Open XML workbook
pub struct XlsxExporter {
    file_stem: String,
}

impl Default for XlsxExporter {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_STEM)
    }
}

impl XlsxExporter {
    pub fn new(file_stem: impl Into<String>) -> Self {
        Self {
            file_stem: file_stem.into(),
        }
    }

    fn write_sheet(worksheet: &mut Worksheet, records: &ExportRecordSet) -> Result<(), XlsxError> {
        let bold = Format::new().set_bold();

        worksheet.write_string_with_format(0, 0, &records.index_header, &bold)?;
        for (i, label) in records.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, column(i + 1)?, label, &bold)?;
        }

        for (r, row) in records.rows.iter().enumerate() {
            let row_num = RowNum::try_from(r + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
            worksheet.write_string(row_num, 0, &row.entity)?;
            for (i, value) in row.values.iter().enumerate() {
                if let Some(v) = value {
                    worksheet.write_number(row_num, column(i + 1)?, *v)?;
                }
            }
        }

        worksheet.autofit();
        Ok(())
    }
}

fn column(index: usize) -> Result<ColNum, XlsxError> {
    ColNum::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}

impl ExportSerializer for XlsxExporter {
    fn mime_type(&self) -> &'static str {
        XLSX_MIME_TYPE
    }

    fn file_name(&self) -> String {
        format!("{}.xlsx", self.file_stem)
    }

    fn serialize(&self, records: &ExportRecordSet) -> Result<Vec<u8>, ValuationError> {
        let mut workbook = Workbook::new();
        Self::write_sheet(workbook.add_worksheet(), records)
            .map_err(|e| ValuationError::Export(e.to_string()))?;

        workbook
            .save_to_buffer()
            .map_err(|e| ValuationError::Export(e.to_string()))
    }
}

/// Writes export records as CSV: header row of labels, one row per symbol
pub struct CsvExporter {
    file_stem: String,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_STEM)
    }
}

impl CsvExporter {
    pub fn new(file_stem: impl Into<String>) -> Self {
        Self {
            file_stem: file_stem.into(),
        }
    }
}

impl ExportSerializer for CsvExporter {
    fn mime_type(&self) -> &'static str {
        CSV_MIME_TYPE
    }

    fn file_name(&self) -> String {
        format!("{}.csv", self.file_stem)
    }

    fn serialize(&self, records: &ExportRecordSet) -> Result<Vec<u8>, ValuationError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = Vec::with_capacity(records.headers.len() + 1);
        header.push(records.index_header.as_str());
        header.extend(records.headers.iter().map(String::as_str));
        writer
            .write_record(&header)
            .map_err(|e| ValuationError::Export(e.to_string()))?;

        for row in &records.rows {
            let mut record = Vec::with_capacity(row.values.len() + 1);
            record.push(row.entity.clone());
            // Shortest round-trip form; blank for missing
            record.extend(row.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            writer
                .write_record(&record)
                .map_err(|e| ValuationError::Export(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| ValuationError::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;
    use valuation_core::ExportRow;

    fn records() -> ExportRecordSet {
        ExportRecordSet {
            index_header: "Ticker".to_string(),
            headers: vec!["P/E".to_string(), "Dividend Yield".to_string()],
            rows: vec![
                ExportRow {
                    entity: "WMT".to_string(),
                    values: vec![Some(38.42), Some(1.3)],
                },
                ExportRow {
                    entity: "TSLA".to_string(),
                    values: vec![None, Some(0.0)],
                },
            ],
        }
    }

    #[test]
    fn test_xlsx_artifact_metadata() {
        let exporter = XlsxExporter::default();
        let bytes = exporter.serialize(&records()).unwrap();

        // Office Open XML is a zip container
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        assert_eq!(
            exporter.mime_type(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(exporter.file_name(), "valuation_data.xlsx");
        assert_eq!(XlsxExporter::new("q3").file_name(), "q3.xlsx");
    }

    #[test]
    fn test_xlsx_values_read_back_equal() {
        let bytes = XlsxExporter::default().serialize(&records()).unwrap();
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let sheet = workbook.sheet_names()[0].clone();
        let range = workbook.worksheet_range(&sheet).unwrap();

        assert_eq!(range.get((0, 0)), Some(&Data::String("Ticker".to_string())));
        assert_eq!(range.get((0, 1)), Some(&Data::String("P/E".to_string())));
        assert_eq!(range.get((0, 2)), Some(&Data::String("Dividend Yield".to_string())));

        assert_eq!(range.get((1, 0)), Some(&Data::String("WMT".to_string())));
        assert_eq!(range.get((1, 1)), Some(&Data::Float(38.42)));
        assert_eq!(range.get((1, 2)), Some(&Data::Float(1.3)));

        assert_eq!(range.get((2, 0)), Some(&Data::String("TSLA".to_string())));
        assert!(matches!(range.get((2, 1)), None | Some(Data::Empty)));
        assert_eq!(range.get((2, 2)), Some(&Data::Float(0.0)));
    }

    #[test]
    fn test_csv_layout() {
        let exporter = CsvExporter::default();
        let bytes = exporter.serialize(&records()).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(text, "Ticker,P/E,Dividend Yield\nWMT,38.42,1.3\nTSLA,,0\n");
        assert_eq!(exporter.mime_type(), "text/csv");
        assert_eq!(exporter.file_name(), "valuation_data.csv");
    }

    #[test]
    fn test_csv_values_read_back_equal() {
        let bytes = CsvExporter::new("out").serialize(&records()).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());

        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "Ticker");
        assert_eq!(&headers[1], "P/E");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1].parse::<f64>().unwrap(), 38.42);
        assert_eq!(rows[0][2].parse::<f64>().unwrap(), 1.3);
        assert_eq!(&rows[1][1], "");
    }
}
