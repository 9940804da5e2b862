use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::enrich::{Enricher, RuntimeEnricher};
use crate::event::{Event, FieldValue};
use crate::transmission::Transmission;
use crate::transport::{HttpTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

/// Entry point for applications: builds events from shared defaults and
/// hands them to a [`Transmission`].
///
/// Create one per process and keep it for the lifetime of the application;
/// call [`Client::close`] before exiting so buffered events are delivered.
pub struct Client {
    config: Config,
    transmission: Transmission,
    global_fields: HashMap<String, FieldValue>,
    enrichers: Vec<Box<dyn Enricher>>,
}

impl Client {
    /// A client that delivers over HTTPS. Must be called inside a tokio
    /// runtime.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport<T: Transport>(config: Config, transport: T) -> Self {
        let transmission = Transmission::new(&config, transport);

        let mut enrichers: Vec<Box<dyn Enricher>> = Vec::new();
        if config.collect_runtime_stats {
            enrichers.push(Box::new(RuntimeEnricher::new()));
        }

        debug!(
            dataset = config.dataset.as_deref().unwrap_or_default(),
            api_host = %config.api_host,
            max_batch_size = config.max_batch_size,
            "client initialized"
        );

        Self {
            config,
            transmission,
            global_fields: HashMap::new(),
            enrichers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add or replace a field copied into every event created afterwards.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.global_fields.insert(key.into(), value.into());
    }

    pub fn add_enricher(&mut self, enricher: impl Enricher + 'static) {
        self.enrichers.push(Box::new(enricher));
    }

    /// A new event carrying the config's routing defaults, the global
    /// fields, and whatever the enrichers add.
    pub fn new_event(&self) -> Event {
        let mut event = Event::with_fields(&self.config, self.global_fields.clone());
        for enricher in &self.enrichers {
            enricher.enrich(&mut event);
        }
        event
    }

    /// Apply the event's sample rate, then queue it for delivery.
    pub fn send(&self, event: Event) {
        if !should_sample(event.sample_rate) {
            debug!(sample_rate = event.sample_rate, "event dropped by sampling");
            return;
        }
        self.transmission.enqueue(event);
    }

    /// Send everything buffered without waiting for batch thresholds.
    pub fn flush(&self) {
        self.transmission.flush();
    }

    /// Flush and wait until every batch has been delivered or given up on.
    pub async fn close(&self) {
        self.transmission.shutdown().await;
    }
}

/// Keep one event in `rate`.
fn should_sample(rate: u32) -> bool {
    rate <= 1 || rand::random_range(1..=rate) == rate
}
