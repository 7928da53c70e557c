//! JSON-lines event source.
//!
//! Each non-blank line is either an array of attribute values in stream
//! order, or an object `{ "timestamp": <ms>, "data": [...] }`. Lines starting
//! with `#` are comments.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{AttributeType, AttributeValue, Event, StreamDefinition};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::error::CliError;

/// Decodes JSON lines into events of one stream
#[derive(Debug, Clone)]
pub struct EventDecoder {
    stream: StreamDefinition,
}

impl EventDecoder {
    pub fn new(stream: StreamDefinition) -> Self {
        Self { stream }
    }

    /// Decode one line; `Ok(None)` for blank and comment lines
    ///
    /// Events without a timestamp get `default_timestamp`.
    pub fn decode(
        &self,
        line_no: usize,
        line: &str,
        default_timestamp: i64,
    ) -> Result<Option<Event>, CliError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| CliError::invalid_event(line_no, e.to_string()))?;

        let (timestamp, values) = match value {
            Value::Array(values) => (default_timestamp, values),
            Value::Object(mut object) => {
                let timestamp = match object.remove("timestamp") {
                    None | Some(Value::Null) => default_timestamp,
                    Some(ts) => ts.as_i64().ok_or_else(|| {
                        CliError::invalid_event(line_no, "timestamp must be an integer")
                    })?,
                };
                match object.remove("data") {
                    Some(Value::Array(values)) => (timestamp, values),
                    _ => {
                        return Err(CliError::invalid_event(
                            line_no,
                            "object form requires a \"data\" array",
                        ))
                    }
                }
            }
            _ => {
                return Err(CliError::invalid_event(
                    line_no,
                    "expected a JSON array or object",
                ))
            }
        };

        if values.len() != self.stream.attributes.len() {
            return Err(CliError::invalid_event(
                line_no,
                format!(
                    "stream '{}' has {} attributes, got {} values",
                    self.stream.id,
                    self.stream.attributes.len(),
                    values.len()
                ),
            ));
        }

        let data = self
            .stream
            .attributes
            .iter()
            .zip(values)
            .map(|(attribute, value)| {
                convert(attribute.attribute_type, value).ok_or_else(|| {
                    CliError::invalid_event(
                        line_no,
                        format!(
                            "attribute '{}' expects {:?}",
                            attribute.name, attribute.attribute_type
                        ),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Event::new(timestamp, data)))
    }
}

fn convert(attribute_type: AttributeType, value: Value) -> Option<AttributeValue> {
    if value.is_null() {
        return Some(AttributeValue::Null);
    }
    match attribute_type {
        AttributeType::Bool => value.as_bool().map(AttributeValue::Bool),
        AttributeType::Int => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(AttributeValue::Int),
        AttributeType::Long => value.as_i64().map(AttributeValue::Long),
        AttributeType::Float => value.as_f64().map(|v| AttributeValue::Float(v as f32)),
        AttributeType::Double => value.as_f64().map(AttributeValue::Double),
        AttributeType::String => match value {
            Value::String(s) => Some(AttributeValue::String(s)),
            _ => None,
        },
    }
}

/// Line-oriented event reader over a file or stdin
pub struct EventSource {
    lines: Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>,
    decoder: EventDecoder,
    line_no: usize,
}

impl EventSource {
    pub fn new(reader: Box<dyn AsyncRead + Unpin + Send>, decoder: EventDecoder) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            decoder,
            line_no: 0,
        }
    }

    /// Open `path`, or stdin when `None`
    pub async fn open(path: Option<&Path>, decoder: EventDecoder) -> Result<Self, CliError> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = match path {
            Some(path) => Box::new(tokio::fs::File::open(path).await?),
            None => Box::new(tokio::io::stdin()),
        };
        Ok(Self::new(reader, decoder))
    }

    /// Next event, or `None` at end of input
    pub async fn next_event(&mut self) -> Result<Option<Event>, CliError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if let Some(event) = self.decoder.decode(self.line_no, &line, now_millis())? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Lines consumed so far
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
