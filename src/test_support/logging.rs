//! Records the cache's own tracing events for assertions.
//!
//! Only events under the `artifact_cache` target prefix are kept, so logs
//! from other crates or from the test itself never leak into assertions.
//! Lines carry no timestamps or ANSI colour codes.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing::subscriber::with_default;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

use crate::observability::CRATE_TARGET;

/// Byte sink shared between the subscriber's writers and the caller.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `action` and returns the cache log lines at `level` or above that it
/// emitted, alongside its result.
///
/// # Examples
/// ```
/// use artifact_cache::test_support::capture_logs;
/// use tracing::Level;
///
/// let (logs, ()) = capture_logs(Level::DEBUG, || {
///     tracing::debug!(target: "artifact_cache::cache", "cache miss");
///     tracing::debug!(target: "other_crate", "ignored");
/// });
/// assert_eq!(logs.len(), 1);
/// assert!(logs[0].contains("cache miss"));
/// ```
#[must_use]
pub fn capture_logs<F, R>(level: Level, action: F) -> (Vec<String>, R)
where
    F: FnOnce() -> R,
{
    let buffer = SharedBuffer::default();
    let sink = buffer.clone();
    let subscriber = fmt()
        .with_max_level(level)
        .without_time()
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish()
        .with(Targets::new().with_target(CRATE_TARGET, level));

    let result = with_default(subscriber, action);
    (buffer.lines(), result)
}

/// Runs `action`, returning the cache's warnings and errors alongside its
/// result.
#[must_use]
pub fn capture_warn_logs<F, R>(action: F) -> (Vec<String>, R)
where
    F: FnOnce() -> R,
{
    capture_logs(Level::WARN, action)
}
