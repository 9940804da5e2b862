use libhoney::{Client, Config, Event, FieldValue};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// Exceptional init failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("HONEYCOMB_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid HONEYCOMB_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

/// Copy the scalar members of one NDJSON object onto `event`. Returns false
/// when the line is not an object at all.
fn fill_event(event: &mut Event, line_no: usize, line: &str) -> bool {
    let object = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            warn!(line = line_no, "skipping line: not a JSON object");
            return false;
        }
        Err(e) => {
            warn!(line = line_no, error = %e, "skipping line: invalid JSON");
            return false;
        }
    };

    for (key, value) in object {
        match FieldValue::try_from(value) {
            Ok(v) => event.add(key, v),
            Err(e) => warn!(line = line_no, field = %key, error = %e, "skipping field"),
        }
    }
    true
}

#[tokio::main]
async fn main() {
    setup_logging();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    if config.write_key.is_none() {
        fatal("config error", &"HONEYCOMB_WRITE_KEY is not set");
    }
    if config.dataset.is_none() {
        fatal("config error", &"HONEYCOMB_DATASET is not set");
    }

    let client = Client::new(config).unwrap_or_else(|e| fatal("failed to create client", &e));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0usize;
    let mut line_no = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let mut event = client.new_event();
        if fill_event(&mut event, line_no, &line) {
            client.send(event);
            sent += 1;
        }
    }

    debug!(lines = line_no, "stdin closed, flushing");
    client.close().await;
    info!(events = sent, "done");
}
