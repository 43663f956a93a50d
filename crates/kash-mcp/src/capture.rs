// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory log capture.
//!
//! A [`tracing_subscriber::Layer`] that records formatted events into a
//! shared buffer, so tool invocations can return the log lines produced
//! during a run.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Shared buffer of captured log lines.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    /// An empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything captured so far.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(mut lines) => lines.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    fn push(&self, line: String) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line);
    }

    /// A layer that records events into this buffer.
    #[must_use]
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            capture: self.clone(),
        }
    }
}

/// The `tracing` layer backing a [`LogCapture`].
pub struct CaptureLayer {
    capture: LogCapture,
}

struct MessageVisitor {
    rendered: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.rendered, "{value:?} ");
        } else {
            let _ = write!(self.rendered, "{}={value:?} ", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let _ = write!(self.rendered, "{value} ");
        } else {
            let _ = write!(self.rendered, "{}={value} ", field.name());
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("kash") {
            return;
        }
        let mut visitor = MessageVisitor {
            rendered: String::new(),
        };
        event.record(&mut visitor);
        let line = format!(
            "{} {} {}",
            metadata.level(),
            metadata.target(),
            visitor.rendered.trim_end()
        );
        self.capture.push(line);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn captures_kash_events_only() {
        let capture = LogCapture::new();
        let subscriber = tracing_subscriber::registry().with(capture.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "kash.exec", action = "lowercase", "running action");
            tracing::info!(target: "other.crate", "should not be captured");
            tracing::warn!(target: "kash.store", path = "docs/x.doc.md", "archived item");
        });

        let lines = capture.drain();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("running action"));
        assert!(lines[0].contains("lowercase"));
        assert!(lines[1].contains("WARN"));

        // Draining empties the buffer.
        assert!(capture.drain().is_empty());
    }
}
