//! CSV implementation of the tabular codec used by check import/export.
//!
//! Spreadsheets exported by banks and accountants are rarely tidy, so the
//! reader is configured flexible: rows may have differing field counts and
//! the record shape is validated downstream, not here.

use csv::{ReaderBuilder, WriterBuilder};

use tesoro_core::{CodecError, TabularCodec};

/// Comma-separated values, UTF-8, first row is the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl CsvCodec {
    pub fn new() -> Self {
        CsvCodec
    }
}

impl TabularCodec for CsvCodec {
    fn encode(&self, rows: &[Vec<String>]) -> Result<Vec<u8>, CodecError> {
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, CodecError> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| CodecError::Decode(e.to_string()))?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
