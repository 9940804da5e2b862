//! Client-side batching of telemetry events for delivery to a Honeycomb
//! style batch ingestion API.
//!
//! Events are grouped per destination (API host, write key and dataset),
//! encoded as a JSON array and POSTed to `/1/batch/<dataset>` once a batch
//! fills up or its send frequency elapses.

mod client;
mod config;
mod enrich;
mod event;
mod retry;
mod serializer;
mod transmission;
mod transport;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientError};
pub use config::{Config, ConfigError};
pub use enrich::{Enricher, RuntimeEnricher};
pub use event::{DestinationKey, Event, FieldValue, FieldValueError};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use serializer::{EncodeError, encode_batch};
pub use transmission::Transmission;
pub use transport::{BatchRequest, HttpTransport, TEAM_HEADER, Transport, TransportError, USER_AGENT};
