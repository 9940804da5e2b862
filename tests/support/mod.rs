// Each integration test compiles this module independently via `mod support;`,
// so items used by one test appear unused in others.
#![allow(unused)]

mod collector;

pub use collector::{CollectedBatch, Collector};

use std::time::Duration;

use libhoney::Config;

/// A config pointed at `collector` with timers short enough for real-time tests.
pub fn config_for(collector: &Collector) -> Config {
    let mut config = Config::new("IntegrationKey", "integration");
    config.api_host = collector.url().parse().expect("collector URL is valid");
    config.send_frequency = Duration::from_millis(20);
    config.retry_base_delay = Duration::from_millis(10);
    config.collect_runtime_stats = false;
    config
}
