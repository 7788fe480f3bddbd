//! Structured logging using **tracing**.
//!
//! The optimizer emits one span per pipeline phase. `PhaseTimer` opens the
//! span and reports the elapsed time when the phase ends, so `RUST_LOG=debug`
//! gives a per-phase profile of a run.

use std::time::Instant;

use tracing::{debug, span::EnteredSpan, Level};

/// Initializes the global tracing subscriber.
///
/// Call once at the beginning of the process. Logs go to stderr so that the
/// optimized source can be written to stdout.
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=shakecc_core=debug`)
pub fn init_structured_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    // `try_init` so tests and embedders that already installed a subscriber
    // keep theirs.
    let result = if json {
        builder
            .json()
            .with_ansi(false)
            .with_current_span(true)
            .try_init()
    } else {
        builder.compact().try_init()
    };

    if let Err(e) = result {
        debug!(detail = %e, "tracing subscriber already installed");
    }
}

/// Span guard for one pipeline phase.
///
/// Mirrors a scoped timer: created at the start of a phase, logs the elapsed
/// time when dropped.
pub struct PhaseTimer {
    phase: &'static str,
    started: Instant,
    _span: EnteredSpan,
}

impl PhaseTimer {
    /// Enter the span for `phase` and start the clock.
    pub fn start(phase: &'static str) -> Self {
        let span = tracing::span!(Level::INFO, "phase", phase = phase).entered();
        Self {
            phase,
            started: Instant::now(),
            _span: span,
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        debug!(
            phase = self.phase,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "phase finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_timer_without_subscriber() {
        let timer = PhaseTimer::start("unit-test");
        assert_eq!(timer.phase, "unit-test");
        drop(timer);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_structured_logging(false);
        init_structured_logging(true);
        tracing::warn!(detail = "still fine");
    }
}
