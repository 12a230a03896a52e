//! Background reporting of pipeline events.

use bf_core::events::{Event, EventBus, EventPayload};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A task feeding every event on a bus to a handler.
pub struct Observer {
    handle: JoinHandle<()>,
    stop: CancellationToken,
}

impl Observer {
    /// Subscribe to `events` now and hand each event to `on_event` in order.
    pub fn spawn<F>(events: &EventBus, mut on_event: F) -> Self
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut rx = events.subscribe();
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                // Queued events win over the stop signal so nothing is lost.
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(event) => on_event(event),
                        Err(RecvError::Lagged(n)) => tracing::debug!("Observer skipped {n} events"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = stopped.cancelled() => break,
                }
            }
        });

        Self { handle, stop }
    }

    /// Handle everything published so far, then stop.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            tracing::debug!("Observer task ended abnormally: {e}");
        }
    }
}

/// Write an event to the log. Warnings are logged here and nowhere else.
pub fn log_event(event: Event) {
    match event.payload {
        EventPayload::Progress {
            processed_secs,
            total_secs,
            eta_secs,
            speed,
        } => {
            let percent = if total_secs > 0.0 {
                processed_secs / total_secs * 100.0
            } else {
                0.0
            };
            tracing::info!(
                "{:5.1}% {} / {}  speed {}  eta {}",
                percent,
                clock(processed_secs),
                clock(total_secs),
                speed.map_or("-".to_string(), |s| format!("{s:.2}x")),
                eta_secs.map_or("-".to_string(), clock),
            );
        }
        EventPayload::Warning { message } => tracing::warn!("{message}"),
        EventPayload::StateChanged { state } => {
            tracing::debug!("Run {} is {state}", event.run_id)
        }
        EventPayload::Finished { .. } => {}
    }
}

/// `hh:mm:ss`.
pub fn clock(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::RunId;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn finish_delivers_events_already_published() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = Observer::spawn(&bus, move |event| {
            if let EventPayload::Warning { message } = event.payload {
                sink.lock().unwrap().push(message);
            }
        });

        let run_id = RunId::new();
        for i in 0..20 {
            bus.publish(
                run_id,
                EventPayload::Warning {
                    message: format!("warning {i}"),
                },
            );
        }
        observer.finish().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen.first().map(String::as_str), Some("warning 0"));
        assert_eq!(seen.last().map(String::as_str), Some("warning 19"));
    }

    #[tokio::test]
    async fn finish_returns_when_nothing_was_published() {
        let bus = EventBus::default();
        let observer = Observer::spawn(&bus, |_| {});
        observer.finish().await;
    }

    #[test]
    fn clock_formats_hours_minutes_seconds() {
        assert_eq!(clock(3725.4), "01:02:05");
        assert_eq!(clock(-3.0), "00:00:00");
    }
}
