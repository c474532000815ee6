use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("inception.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("inception.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("inception.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("inception.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("inception.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("inception.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("inception.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("inception.stream.duration_seconds");

pub(crate) static LOGIN_ATTEMPTS: Counter = Counter::new("inception.login.attempts");
pub(crate) static LOGIN_FAILURES: Counter = Counter::new("inception.login.failures");
pub(crate) static LOGIN_DURATION: Moments = Moments::new("inception.login.duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&LOGIN_ATTEMPTS);
    collector.register_counter(&LOGIN_FAILURES);
    collector.register_moments(&LOGIN_DURATION);
}
