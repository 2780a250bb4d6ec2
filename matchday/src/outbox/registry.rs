//! Event type registry: string tag → payload decoder.
//!
//! Built once at startup from the explicit decoder table in
//! [`DomainEvent::decoders`] — a compile-time map, not a runtime type scan.
//! A duplicate registration is logged and the latest decoder wins; one bad
//! entry never prevents the registry from initializing.

use crate::events::{DomainEvent, EventDecodeFn};
use log::warn;
use std::collections::HashMap;
use thiserror::Error;

/// Registry resolution errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No decoder is registered for the tag. This is a permanent failure for
    /// the message carrying it: it counts against the retry budget and
    /// eventually dead-letters.
    #[error("no event type registered for tag `{0}`")]
    UnknownType(String),

    #[error("malformed payload for `{tag}`: {source}")]
    MalformedPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Maps persisted event type tags to concrete event shapes.
#[derive(Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<&'static str, EventDecodeFn>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every event type this crate defines.
    pub fn with_known_events() -> Self {
        let mut registry = Self::new();
        for &(tag, decode) in DomainEvent::decoders() {
            registry.register(tag, decode);
        }
        registry
    }

    /// Register a decoder for `tag`. Replacing an existing registration is
    /// logged, never fatal.
    pub fn register(&mut self, tag: &'static str, decode: EventDecodeFn) {
        if self.decoders.insert(tag, decode).is_some() {
            warn!("duplicate event type registration for `{tag}`; keeping the latest");
        }
    }

    /// Resolve `tag` and decode `payload` into a domain event.
    pub fn decode(&self, tag: &str, payload: serde_json::Value) -> Result<DomainEvent, RegistryError> {
        let decode = self
            .decoders
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownType(tag.to_string()))?;
        decode(payload).map_err(|source| RegistryError::MalformedPayload {
            tag: tag.to_string(),
            source,
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}
