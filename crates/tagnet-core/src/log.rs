// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Text event logging callback.
//!
//! The core reports user-facing events (connects, read/write outcomes,
//! subscriptions, notification batches, reconnect attempts) through a single
//! line-of-text callback. The core never assumes a rendering surface; thread
//! safety of the actual output is the collaborator's responsibility.

use std::fmt;
use std::sync::Arc;

/// A shareable single-line text log callback.
///
/// Cloning is cheap; all clones invoke the same underlying function. The
/// default is a no-op sink.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<dyn Fn(&str) + Send + Sync>,
}

impl EventLog {
    /// Creates an event log from a callback.
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// Creates a no-op event log.
    pub fn disabled() -> Self {
        Self::new(|_| {})
    }

    /// Emits one line.
    #[inline]
    pub fn log(&self, line: &str) {
        (self.inner)(line);
    }

    /// Emits one formatted line.
    #[inline]
    pub fn logf(&self, args: fmt::Arguments<'_>) {
        (self.inner)(&args.to_string());
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_event_log_captures_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let log = EventLog::new(move |line| captured.lock().unwrap().push(line.to_string()));

        log.log("hello");
        log.logf(format_args!("value={}", 42));

        let lines = lines.lock().unwrap();
        assert_eq!(lines.as_slice(), ["hello", "value=42"]);
    }

    #[test]
    fn test_disabled_log_is_noop() {
        let log = EventLog::disabled();
        log.log("dropped");
    }
}
