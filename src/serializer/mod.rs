use std::collections::HashMap;
use std::io;

use bytes::Bytes;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use thiserror::Error;

use crate::event::{Event, FieldValue};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("field {key:?} holds a non-finite float")]
    NonFiniteFloat { key: String },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One element of the batch body.
#[derive(Serialize)]
struct WireEvent<'a> {
    timestamp: String,
    samplerate: u32,
    data: &'a HashMap<String, FieldValue>,
}

impl<'a> WireEvent<'a> {
    fn from_event(event: &'a Event) -> Result<Self, EncodeError> {
        // serde_json writes NaN and infinities as null, which would silently
        // change the field's type on the server.
        if let Some((key, _)) = event
            .fields()
            .iter()
            .find(|(_, v)| matches!(v, FieldValue::Float(f) if !f.is_finite()))
        {
            return Err(EncodeError::NonFiniteFloat { key: key.clone() });
        }

        Ok(Self {
            timestamp: event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            samplerate: event.sample_rate.max(1),
            data: event.fields(),
        })
    }
}

/// JSON formatter that writes `/` as `\/` inside strings.
struct EscapedSlashFormatter;

impl Formatter for EscapedSlashFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut parts = fragment.split('/');
        if let Some(first) = parts.next() {
            writer.write_all(first.as_bytes())?;
        }
        for part in parts {
            writer.write_all(b"\\/")?;
            writer.write_all(part.as_bytes())?;
        }
        Ok(())
    }
}

/// Encode events, in order, as the JSON array body of a batch request.
pub fn encode_batch(events: &[Event]) -> Result<Bytes, EncodeError> {
    let wire = events
        .iter()
        .map(WireEvent::from_event)
        .collect::<Result<Vec<_>, _>>()?;

    let mut body = Vec::with_capacity(events.len() * 128);
    let mut ser = Serializer::with_formatter(&mut body, EscapedSlashFormatter);
    wire.serialize(&mut ser)?;
    Ok(Bytes::from(body))
}
