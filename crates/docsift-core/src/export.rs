//! Tabular export of a chunk list: one row per chunk, columns `Page` and `Content`.
//!
//! Output is UTF-8 with a byte-order mark so spreadsheet tools detect the encoding.

use std::io::Write;

use crate::chunks::Chunk;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Write `chunks` as CSV to `writer`, in chunk order.
pub fn write_csv<W: Write>(chunks: &[Chunk], mut writer: W) -> Result<(), ExportError> {
    writer.write_all(UTF8_BOM)?;
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);
    csv.write_record(["Page", "Content"])?;
    for chunk in chunks {
        let page = chunk.page.to_string();
        csv.write_record([page.as_str(), chunk.text.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn to_csv_bytes(chunks: &[Chunk]) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    write_csv(chunks, &mut out)?;
    Ok(out)
}

/// Download name for the export of `key`.
pub fn report_file_name(key: &str) -> String {
    format!("{key}_report.csv")
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}
