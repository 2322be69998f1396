use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("anthroshell.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("anthroshell.client.request_errors");
pub(crate) static CLIENT_UNCHECKED_STATUS: Counter =
    Counter::new("anthroshell.client.unchecked_status");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("anthroshell.client.request_duration_seconds");

pub(crate) static STREAM_BYTES: Counter = Counter::new("anthroshell.stream.bytes");
pub(crate) static STREAM_FRAMES: Counter = Counter::new("anthroshell.stream.frames");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter =
    Counter::new("anthroshell.stream.malformed_frames");
pub(crate) static STREAM_COMPLETIONS: Counter = Counter::new("anthroshell.stream.completions");
pub(crate) static STREAM_PARTIAL: Counter = Counter::new("anthroshell.stream.partial");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("anthroshell.stream.errors");

pub(crate) static CHAT_TURNS: Counter = Counter::new("anthroshell.chat.turns");
pub(crate) static CHAT_TURN_FAILURES: Counter = Counter::new("anthroshell.chat.turn_failures");
pub(crate) static CHAT_TURN_DURATION: Moments =
    Moments::new("anthroshell.chat.turn_duration_seconds");

pub(crate) static SSH_SESSIONS: Counter = Counter::new("anthroshell.ssh.sessions");
pub(crate) static SSH_SESSION_ERRORS: Counter = Counter::new("anthroshell.ssh.session_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_UNCHECKED_STATUS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_COMPLETIONS);
    collector.register_counter(&STREAM_PARTIAL);
    collector.register_counter(&STREAM_ERRORS);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_TURN_FAILURES);
    collector.register_moments(&CHAT_TURN_DURATION);

    collector.register_counter(&SSH_SESSIONS);
    collector.register_counter(&SSH_SESSION_ERRORS);
}
