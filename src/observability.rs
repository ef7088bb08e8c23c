use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("salon.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("salon.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("salon.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("salon.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("salon.stream.errors");
pub(crate) static STREAM_MALFORMED: Counter = Counter::new("salon.stream.malformed_payloads");
pub(crate) static STREAM_BYTES: Counter = Counter::new("salon.stream.bytes");

pub(crate) static TURNS_COMMITTED: Counter = Counter::new("salon.turn.committed");
pub(crate) static TURNS_FAILED: Counter = Counter::new("salon.turn.failed");
pub(crate) static TURNS_CANCELLED: Counter = Counter::new("salon.turn.cancelled");
pub(crate) static TURNS_REJECTED: Counter = Counter::new("salon.turn.rejected_in_flight");
pub(crate) static TURN_DURATION: Moments = Moments::new("salon.turn.duration_seconds");

pub(crate) static STORE_WRITES: Counter = Counter::new("salon.store.writes");
pub(crate) static STORE_WRITE_ERRORS: Counter = Counter::new("salon.store.write_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_MALFORMED);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&TURNS_COMMITTED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_counter(&TURNS_CANCELLED);
    collector.register_counter(&TURNS_REJECTED);
    collector.register_moments(&TURN_DURATION);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_WRITE_ERRORS);
}
