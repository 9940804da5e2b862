use crate::event::Event;

/// A step run on every event built by [`crate::Client::new_event`], after
/// global fields are applied.
pub trait Enricher: Send + Sync {
    fn enrich(&self, event: &mut Event);
}

impl<F> Enricher for F
where
    F: Fn(&mut Event) + Send + Sync,
{
    fn enrich(&self, event: &mut Event) {
        self(event)
    }
}

/// Adds a description of the running process: OS, CPU architecture and pid.
pub struct RuntimeEnricher {
    process_id: i64,
}

impl RuntimeEnricher {
    pub fn new() -> Self {
        Self {
            process_id: std::process::id().into(),
        }
    }
}

impl Default for RuntimeEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for RuntimeEnricher {
    fn enrich(&self, event: &mut Event) {
        event.add("runtime_os", std::env::consts::OS);
        event.add("runtime_arch", std::env::consts::ARCH);
        event.add("process_id", self.process_id);
    }
}
