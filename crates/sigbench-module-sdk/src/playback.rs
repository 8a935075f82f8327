use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::panic_message;

/// Progress reports from detached playback jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { label: String },
    Finished { label: String },
    Failed { label: String, message: String },
}

/// Hands long-running side effects (audio playback) off the interactive
/// thread.
///
/// Jobs are fire-and-forget: the host keeps no cancellation handle, makes no
/// ordering promise relative to later invocations and never folds job
/// failures into the invocation result. Outcomes are only reported as
/// [`PlaybackEvent`]s.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    events: Sender<PlaybackEvent>,
}

impl PlaybackHandle {
    pub fn new(events: Sender<PlaybackEvent>) -> Self {
        Self { events }
    }

    /// Create a handle together with the receiving end of its event stream.
    pub fn channel() -> (Self, Receiver<PlaybackEvent>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    pub fn spawn<F>(&self, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let label = label.into();
        let events = self.events.clone();
        let thread_label = label.clone();
        let spawned = thread::Builder::new()
            .name(format!("playback-{label}"))
            .spawn(move || {
                let label = thread_label;
                let _ = events.send(PlaybackEvent::Started {
                    label: label.clone(),
                });
                let event = match catch_unwind(AssertUnwindSafe(job)) {
                    Ok(Ok(())) => PlaybackEvent::Finished { label },
                    Ok(Err(err)) => PlaybackEvent::Failed {
                        label,
                        message: format!("{err:#}"),
                    },
                    Err(payload) => PlaybackEvent::Failed {
                        label,
                        message: format!("panicked: {}", panic_message(payload.as_ref())),
                    },
                };
                let _ = events.send(event);
            });
        if let Err(err) = spawned {
            let _ = self.events.send(PlaybackEvent::Failed {
                label,
                message: format!("failed to start playback thread: {err}"),
            });
        }
    }
}
