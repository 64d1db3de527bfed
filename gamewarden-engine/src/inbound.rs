//! Server events waiting for the adapter main loop.
//!
//! The network thread pushes, the adapter pops. Items carry an expiry so a
//! stalled adapter never replays minutes-old events after it recovers.

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use gamewarden_protocols::Packet;
use tracing::{error, warn};

struct Item {
    packet: Packet,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct InboundQueue {
    tx: Sender<Item>,
    rx: Receiver<Item>,
    ttl: Duration,
    put_timeout: Duration,
}

impl InboundQueue {
    pub fn new(capacity: usize, ttl: Duration, put_timeout: Duration) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            ttl,
            put_timeout,
        }
    }

    /// Returns `false` when the packet had to be dropped.
    pub fn push(&self, packet: Packet) -> bool {
        let item = Item {
            packet,
            expires_at: Instant::now() + self.ttl,
        };
        match self.tx.send_timeout(item, self.put_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(item)) | Err(SendTimeoutError::Disconnected(item)) => {
                error!(packet = ?item.packet.words, "Inbound event queue full, dropping event");
                false
            }
        }
    }

    /// Next unexpired packet, waiting at most `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(item) if item.expires_at < Instant::now() => {
                    warn!(packet = ?item.packet.words, "Dropping expired server event");
                }
                Ok(item) => return Some(item.packet),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discards everything queued, e.g. after the connection was lost.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> Packet {
        Packet::request(0, [name])
    }

    #[test]
    fn test_fifo() {
        let queue = InboundQueue::new(4, Duration::from_secs(10), Duration::from_millis(10));
        assert!(queue.push(event("a")));
        assert!(queue.push(event("b")));
        assert_eq!(queue.pop(Duration::ZERO).unwrap().name(), Some("a"));
        assert_eq!(queue.pop(Duration::ZERO).unwrap().name(), Some("b"));
        assert!(queue.pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_full_queue_drops() {
        let queue = InboundQueue::new(1, Duration::from_secs(10), Duration::from_millis(10));
        assert!(queue.push(event("a")));
        assert!(!queue.push(event("b")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_expired_items_are_skipped() {
        let queue = InboundQueue::new(4, Duration::from_millis(5), Duration::from_millis(10));
        queue.push(event("stale"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(queue.pop(Duration::from_millis(10)).is_none());
        assert!(queue.is_empty());
    }
}
