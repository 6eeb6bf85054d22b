//! Incremental response encoding for large exports
//!
//! Consumes a lazy stream of record batches and yields encoded chunks as
//! they are produced — only one batch is ever held in memory. Supports a
//! JSON array, newline-delimited JSON, and CSV with a header derived from
//! the first record.

use crate::error::Result;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Output encoding for streamed record batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    JsonArray,
    NdJson,
    Csv,
}

struct Encoder {
    format: StreamFormat,
    started: bool,
    csv_header: Option<Vec<String>>,
}

impl Encoder {
    fn new(format: StreamFormat) -> Self {
        Self {
            format,
            started: false,
            csv_header: None,
        }
    }

    fn encode_batch(&mut self, batch: &[Value]) -> Result<Bytes> {
        let mut out = String::new();

        for record in batch {
            match self.format {
                StreamFormat::JsonArray => {
                    out.push(if self.started { ',' } else { '[' });
                    out.push_str(&serde_json::to_string(record)?);
                }
                StreamFormat::NdJson => {
                    out.push_str(&serde_json::to_string(record)?);
                    out.push('\n');
                }
                StreamFormat::Csv => {
                    if self.csv_header.is_none() {
                        let header = header_for(record);
                        out.push_str(&csv_row(header.iter().map(String::as_str)));
                        self.csv_header = Some(header);
                    }
                    if let Some(header) = &self.csv_header {
                        let cells: Vec<String> = header
                            .iter()
                            .map(|column| match record {
                                Value::Object(map) => csv_cell(map.get(column)),
                                other => csv_cell(Some(other)),
                            })
                            .collect();
                        out.push_str(&csv_row(cells.iter().map(String::as_str)));
                    }
                }
            }
            self.started = true;
        }

        Ok(Bytes::from(out))
    }

    fn finish(&mut self) -> Option<Bytes> {
        match self.format {
            StreamFormat::JsonArray => {
                if self.started {
                    Some(Bytes::from_static(b"]"))
                } else {
                    Some(Bytes::from_static(b"[]"))
                }
            }
            StreamFormat::NdJson | StreamFormat::Csv => None,
        }
    }
}

/// Column order for the CSV header, taken from the first record
fn header_for(record: &Value) -> Vec<String> {
    match record {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => vec!["value".to_string()],
    }
}

fn csv_row<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut row = String::new();
    for (i, field) in fields.enumerate() {
        if i > 0 {
            row.push(',');
        }
        row.push_str(&csv_escape(field));
    }
    row.push('\n');
    row
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        // Nested structures are embedded as JSON text
        Some(other) => other.to_string(),
    }
}

/// Encode a stream of record batches as a stream of output chunks
///
/// For `JsonArray` a final `]` (or `[]` for an empty input) is emitted
/// after the last batch. Input errors pass through and terminate the
/// stream.
pub fn encode_batches<S>(
    batches: S,
    format: StreamFormat,
) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: Stream<Item = Result<Vec<Value>>> + Send + 'static,
{
    let state = (Box::pin(batches), Encoder::new(format), false);

    futures::stream::unfold(state, |(mut batches, mut encoder, done)| async move {
        if done {
            return None;
        }

        match batches.next().await {
            Some(Ok(batch)) => match encoder.encode_batch(&batch) {
                Ok(chunk) => Some((Ok(chunk), (batches, encoder, false))),
                Err(e) => Some((Err(e), (batches, encoder, true))),
            },
            Some(Err(e)) => Some((Err(e), (batches, encoder, true))),
            None => encoder
                .finish()
                .map(|tail| (Ok(tail), (batches, encoder, true))),
        }
    })
}

/// Adapt an `mpsc` channel of record batches into an encodable stream
///
/// Handlers that page through the database send each batch as it is
/// fetched and drop the sender to end the export.
pub fn batches_from_channel(
    rx: mpsc::Receiver<Result<Vec<Value>>>,
) -> impl Stream<Item = Result<Vec<Value>>> + Send {
    ReceiverStream::new(rx)
}
