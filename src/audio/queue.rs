//! Bounded frame queue between the capture callback and the pipeline worker.
//!
//! Single producer (the audio driver's callback), single consumer (the
//! pipeline thread). Overflow evicts the oldest frame so the consumer always
//! works on the freshest audio; frames are never duplicated or reordered.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::time::Duration;

/// A fixed-length block of 16-bit mono PCM samples.
pub type Frame = Vec<i16>;

/// Why a blocking pop returned without a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// No frame arrived within the timeout.
    Timeout,
    /// The producer side was dropped and the queue is drained.
    Disconnected,
}

/// Producer half: non-blocking push with drop-oldest eviction.
#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<Frame>,
    // Clone of the consumer's receiver, used only to evict the head on
    // overflow. Competing with the consumer for one slot is fine: either way
    // the oldest frame leaves the queue.
    evict_rx: Receiver<Frame>,
}

/// Consumer half: timeout-bounded blocking pop.
pub struct FrameConsumer {
    rx: Receiver<Frame>,
}

/// Create a bounded frame queue with the given capacity.
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let evict_rx = rx.clone();
    (FrameProducer { tx, evict_rx }, FrameConsumer { rx })
}

impl FrameProducer {
    /// Push a frame without blocking.
    ///
    /// At capacity, the single oldest frame is evicted first; the remainder
    /// keeps its FIFO order. Returns the number of frames evicted (0 or 1).
    pub fn push(&self, frame: Frame) -> usize {
        match self.tx.try_send(frame) {
            Ok(()) => 0,
            Err(TrySendError::Full(frame)) => {
                let evicted = usize::from(self.evict_rx.try_recv().is_ok());
                // A second failure means the consumer raced us for the freed
                // slot; the new frame is the freshest data we have, so losing
                // the older one it displaced is still drop-oldest.
                self.tx.try_send(frame).ok();
                evicted
            }
            Err(TrySendError::Disconnected(_)) => 0,
        }
    }
}

impl FrameConsumer {
    /// Block up to `timeout` for the oldest frame.
    pub fn pop(&self, timeout: Duration) -> Result<Frame, PopError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Timeout,
            RecvTimeoutError::Disconnected => PopError::Disconnected,
        })
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(value: i16) -> Frame {
        vec![value; 4]
    }

    #[test]
    fn test_push_pop_preserves_fifo_order() {
        let (producer, consumer) = frame_queue(5);

        for i in 0..5 {
            producer.push(frame_of(i));
        }

        for i in 0..5 {
            let frame = consumer.pop(Duration::from_millis(10)).unwrap();
            assert_eq!(frame, frame_of(i));
        }
    }

    #[test]
    fn test_overflow_evicts_only_the_oldest() {
        let (producer, consumer) = frame_queue(3);

        producer.push(frame_of(0));
        producer.push(frame_of(1));
        producer.push(frame_of(2));

        let evicted = producer.push(frame_of(3));
        assert_eq!(evicted, 1);

        // Survivors are exactly the 3 most recent, in original order.
        assert_eq!(consumer.pop(Duration::from_millis(10)).unwrap(), frame_of(1));
        assert_eq!(consumer.pop(Duration::from_millis(10)).unwrap(), frame_of(2));
        assert_eq!(consumer.pop(Duration::from_millis(10)).unwrap(), frame_of(3));
    }

    #[test]
    fn test_queue_never_exceeds_capacity() {
        let (producer, consumer) = frame_queue(4);

        for i in 0..100 {
            producer.push(frame_of(i));
            assert!(consumer.len() <= 4);
        }

        // The survivors are the 4 most recently pushed, in order.
        for expected in 96..100 {
            let frame = consumer.pop(Duration::from_millis(10)).unwrap();
            assert_eq!(frame, frame_of(expected));
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_pop_times_out_on_empty_queue() {
        let (_producer, consumer) = frame_queue(2);

        let result = consumer.pop(Duration::from_millis(20));
        assert_eq!(result, Err(PopError::Timeout));
    }

    #[test]
    fn test_pop_reports_disconnect_after_producer_drop() {
        let (producer, consumer) = frame_queue(2);
        producer.push(frame_of(7));
        drop(producer);

        // Buffered frame is still delivered, then disconnect.
        assert_eq!(consumer.pop(Duration::from_millis(10)).unwrap(), frame_of(7));
        assert_eq!(
            consumer.pop(Duration::from_millis(10)),
            Err(PopError::Disconnected)
        );
    }

    #[test]
    fn test_push_after_consumer_drop_does_not_panic() {
        let (producer, consumer) = frame_queue(2);
        drop(consumer);

        assert_eq!(producer.push(frame_of(1)), 0);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (producer, consumer) = frame_queue(10);

        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                producer.push(frame_of(i));
            }
        });

        let mut received = Vec::new();
        while received.len() < 10 {
            if let Ok(frame) = consumer.pop(Duration::from_millis(100)) {
                received.push(frame[0]);
            }
        }
        handle.join().unwrap();

        assert_eq!(received, (0..10).collect::<Vec<i16>>());
    }
}
