// THEORY:
// Notifications are slow (writing a JPEG, running a mailer) and the capture
// loop must not stall on them. `BackgroundNotifier` is the `Notifier` the
// dispatcher sees: it only queues the snapshot. A task on the tokio runtime
// drains the queue and runs the real notifier on the blocking pool, one
// snapshot at a time, logging failures as it goes. Snapshots get the same
// status line and timestamp as the recording before they are handed over.
//
// Dropping the `BackgroundNotifier` closes the queue. The worker then finishes
// whatever is still pending and exits, so awaiting its handle at shutdown
// guarantees every queued snapshot was attempted.

use crate::convert;
use sentry_vision::{Frame, Notifier, SinkError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type BoxedNotifier = Box<dyn Notifier + Send>;

pub struct BackgroundNotifier {
    sender: mpsc::UnboundedSender<Frame>,
}

impl BackgroundNotifier {
    /// Starts the delivery worker on `runtime`. The returned handle resolves to
    /// the number of snapshots delivered once the notifier is dropped.
    pub fn spawn(runtime: &Handle, inner: BoxedNotifier) -> (Self, JoinHandle<u64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = runtime.spawn(deliver(receiver, inner));
        (Self { sender }, worker)
    }
}

impl Notifier for BackgroundNotifier {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
        self.sender
            .send(snapshot.clone())
            .map_err(|_| SinkError::Notification("delivery worker has stopped".to_string()))
    }
}

async fn deliver(mut receiver: mpsc::UnboundedReceiver<Frame>, mut inner: BoxedNotifier) -> u64 {
    let mut delivered = 0;
    while let Some(snapshot) = receiver.recv().await {
        let outcome = tokio::task::spawn_blocking(move || {
            let snapshot = convert::stamped_frame(&snapshot).unwrap_or_else(|e| {
                log::warn!("sending the snapshot without its status line: {e}");
                snapshot
            });
            let result = inner.notify(&snapshot);
            (inner, result)
        })
        .await;

        match outcome {
            Ok((returned, result)) => {
                inner = returned;
                match result {
                    Ok(()) => delivered += 1,
                    Err(e) => log::error!("notification failed: {e}"),
                }
            }
            Err(e) => {
                log::error!("notification worker panicked: {e}");
                break;
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};

    struct Counting(Arc<Mutex<Vec<(u32, bool)>>>);

    impl Notifier for Counting {
        fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
            let stamped = snapshot.image().pixels().any(|p| p.0[0] > 0);
            self.0.lock().unwrap().push((snapshot.width(), stamped));
            Ok(())
        }
    }

    #[test]
    fn queued_snapshots_are_delivered_before_the_worker_exits() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut notifier, worker) =
            BackgroundNotifier::spawn(runtime.handle(), Box::new(Counting(seen.clone())));

        for width in 100..=102 {
            let frame = Frame::new(RgbImage::new(width, 80), Local::now());
            notifier.notify(&frame).unwrap();
        }
        drop(notifier);

        let delivered = runtime.block_on(worker).unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(100, true), (101, true), (102, true)]
        );
    }
}
