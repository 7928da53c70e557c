//! Routing-key templates
//!
//! A template such as `"stock-{{symbol}}"` is compiled once against the
//! stream definition and rendered per event. Templates without placeholders
//! resolve to a single shared key.

use std::fmt::Write as _;

use contracts::{ContractError, DestinationKey, Event, StreamDefinition};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Attribute { name: String, index: usize },
}

/// Compiled routing-key expression
#[derive(Debug, Clone)]
pub struct RoutingTemplate {
    expression: String,
    segments: Vec<Segment>,
    fixed: Option<DestinationKey>,
}

impl RoutingTemplate {
    /// Compile `expression`, resolving every placeholder to an attribute index
    ///
    /// # Errors
    /// `Configuration` on an unknown attribute, an empty placeholder or a
    /// missing `}}`.
    pub fn compile(expression: &str, stream: &StreamDefinition) -> Result<Self, ContractError> {
        let mut segments = Vec::new();
        let mut rest = expression;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + OPEN.len()..];
            let end = after.find(CLOSE).ok_or_else(|| {
                ContractError::configuration(
                    "routing_key",
                    format!("unclosed placeholder in '{expression}'"),
                )
            })?;

            let name = after[..end].trim();
            if name.is_empty() {
                return Err(ContractError::configuration(
                    "routing_key",
                    format!("empty placeholder in '{expression}'"),
                ));
            }
            let index = stream.attribute_index(name).ok_or_else(|| {
                ContractError::configuration(
                    "routing_key",
                    format!("unknown attribute '{name}' in stream '{}'", stream.id),
                )
            })?;

            segments.push(Segment::Attribute {
                name: name.to_string(),
                index,
            });
            rest = &after[end + CLOSE.len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        let fixed = segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
            .then(|| DestinationKey::from(expression));

        Ok(Self {
            expression: expression.to_string(),
            segments,
            fixed,
        })
    }

    /// Template that always yields `key`
    pub fn fixed(key: &str) -> Self {
        Self {
            expression: key.to_string(),
            segments: vec![Segment::Literal(key.to_string())],
            fixed: Some(DestinationKey::from(key)),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    /// Names of the attributes the template reads
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Attribute { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the key for `event`; `None` if the event is shorter than the stream
    pub fn render(&self, event: &Event) -> Option<DestinationKey> {
        if let Some(key) = &self.fixed {
            return Some(key.clone());
        }

        let mut key = String::with_capacity(self.expression.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Attribute { index, .. } => {
                    let value = event.get(*index)?;
                    let _ = write!(key, "{value}");
                }
            }
        }
        Some(DestinationKey::from(key))
    }

    /// Render or fail with `DestinationResolution` for `transport`
    pub fn resolve(&self, transport: &str, event: &Event) -> Result<DestinationKey, ContractError> {
        self.render(event).ok_or_else(|| {
            ContractError::destination_resolution(
                transport,
                format!(
                    "event has {} attributes, '{}' needs more",
                    event.len(),
                    self.expression
                ),
            )
        })
    }
}
