//! Event envelope serialization shared by the file and network transports

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, SecondsFormat, Utc};
use contracts::{AttributeValue, ContractError, DestinationKey, Event, StreamDefinition};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

impl WireFormat {
    /// Read the `format` param (default json)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        match params.get("format").map(String::as_str) {
            Some("bincode") => Ok(Self::Bincode),
            Some("json") | None => Ok(Self::Json),
            Some(other) => Err(ContractError::configuration(
                "params.format",
                format!("unknown format '{other}', expected json or bincode"),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "jsonl",
            Self::Bincode => "bin",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    stream: &'a str,
    destination: &'a str,
    timestamp: i64,
    event_time: Option<String>,
    data: Fields<'a>,
}

/// Attribute values keyed by name, in definition order
struct Fields<'a> {
    names: &'a [String],
    values: &'a [AttributeValue],
    /// Write a variant tag in front of every value
    tagged: bool,
}

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.names.len().min(self.values.len());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in self.names.iter().zip(self.values) {
            if self.tagged {
                map.serialize_entry(name, &TaggedValue::from(value))?;
            } else {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

/// Externally tagged view of an attribute value
///
/// Binary formats carry no self-description, so an untagged null would
/// write nothing and shift every field after it.
#[derive(Serialize)]
enum TaggedValue<'a> {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
    Null,
}

impl<'a> From<&'a AttributeValue> for TaggedValue<'a> {
    fn from(value: &'a AttributeValue) -> Self {
        match value {
            AttributeValue::Bool(v) => Self::Bool(*v),
            AttributeValue::Int(v) => Self::Int(*v),
            AttributeValue::Long(v) => Self::Long(*v),
            AttributeValue::Float(v) => Self::Float(*v),
            AttributeValue::Double(v) => Self::Double(*v),
            AttributeValue::String(v) => Self::String(v),
            AttributeValue::Null => Self::Null,
        }
    }
}

/// Serializes events of one stream for one transport
#[derive(Debug, Clone)]
pub struct EventCodec {
    transport: String,
    stream: String,
    names: Vec<String>,
    format: WireFormat,
}

impl EventCodec {
    pub fn new(transport: &str, stream: &StreamDefinition, format: WireFormat) -> Self {
        Self {
            transport: transport.to_string(),
            stream: stream.id.clone(),
            names: stream.attribute_names().map(str::to_string).collect(),
            format,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encode a single envelope
    pub fn encode(&self, destination: &DestinationKey, event: &Event) -> Result<Bytes, ContractError> {
        let envelope = Envelope {
            stream: &self.stream,
            destination: destination.as_str(),
            timestamp: event.timestamp,
            event_time: DateTime::<Utc>::from_timestamp_millis(event.timestamp)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            data: Fields {
                names: &self.names,
                values: event.data(),
                tagged: self.format == WireFormat::Bincode,
            },
        };

        let encoded = match self.format {
            WireFormat::Json => serde_json::to_vec(&envelope)
                .map_err(|e| ContractError::send_failure(&self.transport, format!("json error: {e}")))?,
            WireFormat::Bincode => bincode::serialize(&envelope)
                .map_err(|e| ContractError::send_failure(&self.transport, format!("bincode error: {e}")))?,
        };
        Ok(Bytes::from(encoded))
    }

    /// Encode with a `u32` big-endian length prefix
    pub fn encode_framed(&self, destination: &DestinationKey, event: &Event) -> Result<Bytes, ContractError> {
        let payload = self.encode(destination, event)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            ContractError::send_failure(&self.transport, format!("frame too large: {} bytes", payload.len()))
        })?;

        let mut frame = BytesMut::with_capacity(4 + payload.len());
        frame.put_u32(len);
        frame.extend_from_slice(&payload);
        Ok(frame.freeze())
    }

    /// Encode as one record of an append-only file
    ///
    /// JSON records are newline-delimited, bincode records length-prefixed.
    pub fn encode_record(&self, destination: &DestinationKey, event: &Event) -> Result<Bytes, ContractError> {
        match self.format {
            WireFormat::Json => {
                let payload = self.encode(destination, event)?;
                let mut record = BytesMut::with_capacity(payload.len() + 1);
                record.extend_from_slice(&payload);
                record.put_u8(b'\n');
                Ok(record.freeze())
            }
            WireFormat::Bincode => self.encode_framed(destination, event),
        }
    }
}
