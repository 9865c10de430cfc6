//! CSV persistence for decoded samples
//!
//! Rows are appended as `src_seq,t_ms,<fields...>`. The column header is
//! written again every time the schema version changes, so a log that spans
//! several HDR records stays self-describing. Each write is flushed
//! immediately.

use crate::error::{Result, StreamError};
use crate::types::{Sample, SchemaState};
use std::fmt::Write as FmtWrite;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends samples to a CSV file
pub struct CsvSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    /// Schema version of the last header row written
    header_version: Option<u64>,
    rows_written: u64,
}

impl CsvSink {
    /// Open `path` for appending, creating it and its parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StreamError::Persistence(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StreamError::Persistence(format!("Failed to open {:?}: {}", path, e)))?;

        tracing::info!("Logging CSV to: {}", path.display());

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            header_version: None,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one sample using the field order of `schema`.
    ///
    /// With an empty schema the sample's own positional fields are used and
    /// no header row is written.
    pub fn write_sample(&mut self, sample: &Sample, schema: &SchemaState) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StreamError::Persistence("sink is closed".to_string()))?;

        if !schema.is_empty() && self.header_version != Some(schema.version()) {
            let header = format!("src_seq,t_ms,{}", schema.fields().join(","));
            writeln!(writer, "{}", header).map_err(persistence_error)?;
            self.header_version = Some(schema.version());
        }

        let mut row = format!("{},{:.3}", sample.source_sequence, sample.timestamp_ms);
        if schema.is_empty() {
            for value in sample.values() {
                push_value(&mut row, *value);
            }
        } else {
            for name in schema.fields() {
                push_value(&mut row, sample.get(name).unwrap_or(f64::NAN));
            }
        }

        writeln!(writer, "{}", row).map_err(persistence_error)?;
        writer.flush().map_err(persistence_error)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush and release the file
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(persistence_error)?;
            tracing::info!(
                "Closed CSV log {} after {} rows",
                self.path.display(),
                self.rows_written
            );
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}

fn push_value(row: &mut String, value: f64) {
    row.push(',');
    // f64 formats NaN as "NaN" and infinities as "inf"/"-inf"
    let _ = write!(row, "{:.6}", value);
}

fn persistence_error(e: std::io::Error) -> StreamError {
    StreamError::Persistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RecordDecoder;
    use crate::types::{ReaderStats, Record};

    fn feed(decoder: &mut RecordDecoder, sink: &mut CsvSink, line: &str) {
        let mut stats = ReaderStats::default();
        if let Record::Sample(sample) = decoder.feed(line, &mut stats).unwrap() {
            sink.write_sample(&sample, decoder.schema()).unwrap();
        }
    }

    #[test]
    fn test_rows_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        let mut decoder = RecordDecoder::new();

        feed(&mut decoder, &mut sink, "HDR,1,X,fields=a,b,rate=10");
        feed(&mut decoder, &mut sink, "DAT,1,1000.0,5,10");
        feed(&mut decoder, &mut sink, "DAT,2,1100.0,6");
        assert_eq!(sink.rows_written(), 2);
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "src_seq,t_ms,a,b\n1,1000.000,5.000000,10.000000\n2,1100.000,6.000000,NaN\n"
        );
    }

    #[test]
    fn test_header_rewritten_on_schema_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        let mut decoder = RecordDecoder::new();

        feed(&mut decoder, &mut sink, "HDR,1,X,fields=a");
        feed(&mut decoder, &mut sink, "DAT,1,0,1");
        feed(&mut decoder, &mut sink, "HDR,1,X,fields=a");
        feed(&mut decoder, &mut sink, "DAT,2,1,2");
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let headers = content.lines().filter(|l| l.starts_with("src_seq")).count();
        assert_eq!(headers, 2);
    }

    #[test]
    fn test_no_header_without_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        let mut decoder = RecordDecoder::new();

        feed(&mut decoder, &mut sink, "DAT,3,2.5,1.5,-2");
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "3,2.500,1.500000,-2.000000\n");
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "previous\n").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        let mut decoder = RecordDecoder::new();
        feed(&mut decoder, &mut sink, "DAT,1,0,1");
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous\n"));
        assert!(sink.writer.is_none());
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::open(dir.path().join("log.csv")).unwrap();
        sink.close().unwrap();

        let schema = SchemaState::with_fields(["a"]);
        let sample = Sample::new(1, 0.0, schema.shared_fields(), vec![1.0]);
        assert!(matches!(
            sink.write_sample(&sample, &schema),
            Err(StreamError::Persistence(_))
        ));
    }
}
