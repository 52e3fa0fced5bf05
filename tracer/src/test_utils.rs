//! Helpers shared by unit tests, integration tests and benches.

use crate::{
    config::{DumpTarget, TraceConfig},
    event::TraceRecord,
    session::Session,
    tracer,
};

/// Starts a session on the calling thread that writes nothing when dropped,
/// so each test observes only its own events.
pub fn fresh_session() -> Session {
    Session::start(TraceConfig::default().with_output(DumpTarget::Off))
}

/// Like [`fresh_session`], with the manifest and dependency export enabled.
pub fn verbose_session() -> Session {
    Session::start(
        TraceConfig::default()
            .with_output(DumpTarget::Off)
            .with_manifest(true)
            .with_dependencies(true),
    )
}

/// Evaluates every event buffered in the root context.
pub fn root_records() -> Vec<TraceRecord> {
    tracer::root_context().records()
}

/// Dumps the root context into a string.
pub fn root_dump() -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = tracer::root_context().dump(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}
