//! Event channel built on crossbeam-channel.
//!
//! Stages hold cheap clones of [`EventSender`]; the front end owns the
//! single [`EventReceiver`].

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::{Event, PipelineEvent};

/// Sends events from pipeline stages.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    pub fn new(sender: Sender<Event>) -> Self {
        Self { inner: sender }
    }

    /// Send an event.
    ///
    /// If the receiver is dropped the event is discarded, so progress
    /// reporting stays optional.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }

    /// Send a status string for the user.
    pub fn status(&self, message: impl Into<String>) {
        self.send(Event::Pipeline(PipelineEvent::Status {
            message: message.into(),
        }));
    }
}

/// Receives events on the front-end side.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event arrives, or every sender is gone
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Iterate until every sender has been dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Constructor for connected sender/receiver pairs.
pub struct EventChannel;

impl EventChannel {
    /// Create an unbounded event channel.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }

    /// Create a bounded event channel; stages block when a slow front end
    /// falls `capacity` events behind.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// A sender whose receiver is already gone, for headless runs and tests.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ScanEvent;
    use std::path::PathBuf;
    use std::thread;

    #[test]
    fn events_can_be_sent_across_threads() {
        let (sender, receiver) = EventChannel::new();

        let handle = thread::spawn(move || {
            sender.send(Event::Scan(ScanEvent::Progress {
                files_scanned: 1024,
                current_path: PathBuf::from("/photos/a.jpg"),
            }));
        });

        handle.join().unwrap();

        match receiver.recv().unwrap() {
            Event::Scan(ScanEvent::Progress { files_scanned, .. }) => {
                assert_eq!(files_scanned, 1024);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn null_sender_does_not_panic() {
        let sender = null_sender();
        sender.status("nobody is listening");
    }

    #[test]
    fn status_helper_wraps_message() {
        let (sender, receiver) = EventChannel::new();
        sender.status("Scanning /photos");

        match receiver.try_recv() {
            Some(Event::Pipeline(PipelineEvent::Status { message })) => {
                assert_eq!(message, "Scanning /photos");
            }
            other => panic!("Wrong event: {other:?}"),
        }
    }

    #[test]
    fn bounded_channel_respects_capacity() {
        let (sender, receiver) = EventChannel::bounded(2);

        sender.status("one");
        sender.status("two");

        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
    }
}
