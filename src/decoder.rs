//! Line decoder for the HDR/DAT wire format
//!
//! The device emits one record per line:
//!
//! ```text
//! HDR,<version>,<tag>,fields=<name1>,<name2>,...,<nameN>[,rate=<hz>]
//! DAT,<src_seq>,<t_ms>,<v1>,<v2>,...,<vK>
//! ```
//!
//! Anything else is passed through as [`Record::Unrecognized`].
//!
//! [`decode`] is pure: it never touches the schema. [`RecordDecoder`] wraps it
//! for the reader thread, owning the [`SchemaState`] and applying each header
//! as it is decoded.

use crate::error::DecodeError;
use crate::types::{Record, ReaderStats, Sample, SchemaState};
use std::sync::Arc;

const HEADER_TAG: &str = "HDR";
const DATA_TAG: &str = "DAT";
const FIELDS_KEY: &str = "fields=";
const RATE_KEY: &str = "rate=";

/// Decode one line against the given schema.
///
/// HDR and DAT lines that fail to parse return a [`DecodeError`]; the caller
/// is expected to drop the line and carry on.
pub fn decode(line: &str, schema: &SchemaState) -> Result<Record, DecodeError> {
    decode_counted(line, schema).map(|(record, _)| record)
}

/// Decode one line, turning decode failures into [`Record::Unrecognized`]
pub fn decode_lossy(line: &str, schema: &SchemaState) -> Record {
    decode(line, schema).unwrap_or_else(|_| Record::Unrecognized {
        raw_line: line.trim().to_string(),
    })
}

/// Extract the ordered field list from an HDR line.
///
/// Returns `None` when the line has no `fields=` section. A trailing
/// `,rate=...` suffix is cut off, names are trimmed and empty names dropped.
pub fn parse_header_fields(line: &str) -> Option<Vec<String>> {
    let idx = line.find(FIELDS_KEY)?;
    let mut payload = line[idx + FIELDS_KEY.len()..].trim();

    if let Some(rate_idx) = payload.find(RATE_KEY) {
        if rate_idx > 0 {
            if let Some(comma) = payload[..rate_idx].rfind(',') {
                payload = &payload[..comma];
            }
        }
    }

    Some(
        payload
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Decode and also report the raw value count of a DAT line
fn decode_counted(line: &str, schema: &SchemaState) -> Result<(Record, Option<usize>), DecodeError> {
    let line = line.trim();
    let tag = line.split(',').next().unwrap_or_default().trim();

    match tag {
        HEADER_TAG => {
            let record = match parse_header_fields(line) {
                Some(raw_fields) => Record::Header { raw_fields },
                None => Record::Unrecognized {
                    raw_line: line.to_string(),
                },
            };
            Ok((record, None))
        }
        DATA_TAG => {
            let (sample, raw_count) = decode_sample(line, schema)?;
            Ok((Record::Sample(sample), Some(raw_count)))
        }
        _ => Ok((
            Record::Unrecognized {
                raw_line: line.to_string(),
            },
            None,
        )),
    }
}

fn decode_sample(line: &str, schema: &SchemaState) -> Result<(Sample, usize), DecodeError> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return Err(DecodeError::TooFewTokens(parts.len()));
    }

    let source_sequence = parts[1]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .ok_or_else(|| DecodeError::BadSequence(parts[1].to_string()))?;

    let timestamp_ms = parts[2]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::BadTimestamp(parts[2].to_string()))?;

    let raw_values = parts[3..]
        .iter()
        .enumerate()
        .map(|(index, token)| parse_value(index, token))
        .collect::<Result<Vec<f64>, DecodeError>>()?;
    let raw_count = raw_values.len();

    let (fields, values) = if schema.is_empty() {
        let names: Arc<[String]> = (0..raw_count).map(|i| format!("f{}", i)).collect();
        (names, raw_values)
    } else {
        let mut values = raw_values;
        values.resize(schema.len(), f64::NAN);
        (schema.shared_fields(), values)
    };

    Ok((
        Sample::new(source_sequence, timestamp_ms, fields, values),
        raw_count,
    ))
}

fn parse_value(index: usize, token: &str) -> Result<f64, DecodeError> {
    if token.is_empty() {
        return Ok(f64::NAN);
    }
    token.parse::<f64>().map_err(|_| DecodeError::BadValue {
        index,
        token: token.to_string(),
    })
}

/// Stateful decoder used by the reader thread.
///
/// Owns the schema and swaps it whenever a non-empty header arrives, so the
/// next sample is labelled with the new field names.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    schema: SchemaState,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current schema
    pub fn schema(&self) -> &SchemaState {
        &self.schema
    }

    /// Decode a line, apply it to the schema if it is a header, and update
    /// the counters in `stats`.
    pub fn feed(&mut self, line: &str, stats: &mut ReaderStats) -> Result<Record, DecodeError> {
        let (record, raw_count) = match decode_counted(line, &self.schema) {
            Ok(decoded) => decoded,
            Err(e) => {
                stats.decode_errors += 1;
                return Err(e);
            }
        };

        match &record {
            Record::Header { raw_fields } => {
                stats.headers += 1;
                if self.schema.replace(raw_fields.clone()) {
                    stats.schema_version = self.schema.version();
                    tracing::info!(
                        "Schema v{}: {:?}",
                        self.schema.version(),
                        self.schema.fields()
                    );
                } else {
                    tracing::debug!("Header carried no field names, schema unchanged");
                }
            }
            Record::Sample(sample) => {
                stats.samples += 1;
                if let Some(count) = raw_count {
                    if !self.schema.is_empty() && count != self.schema.len() {
                        stats.field_count_mismatches += 1;
                        tracing::debug!(
                            "DAT #{} has {} values for {} fields",
                            sample.source_sequence,
                            count,
                            self.schema.len()
                        );
                    }
                }
            }
            Record::Unrecognized { .. } => {
                stats.unrecognized += 1;
            }
        }

        Ok(record)
    }
}
