//! Rate-limited chat delivery.
//!
//! `enqueue` never blocks. A worker thread takes one message at a time,
//! wraps it into protocol-sized lines and sends them with a minimum delay
//! after each line so the server's anti-flood limit is never hit. The worker
//! waits on the queue with a timeout and checks its working flag on every
//! wake-up. [`OutboundQueue::shutdown`] also hangs up the channel, so it
//! returns after at most one line delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use gamewarden_protocols::text;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;

/// Destination of wrapped lines.
pub trait LineSink: Send + Sync {
    fn send_line(&self, line: &str) -> Result<(), EngineError>;
}

impl<F> LineSink for F
where
    F: Fn(&str) -> Result<(), EngineError> + Send + Sync,
{
    fn send_line(&self, line: &str) -> Result<(), EngineError> {
        self(line)
    }
}

#[derive(Debug, Clone)]
pub struct OutboundOptions {
    /// Worker thread name.
    pub name: String,
    pub capacity: usize,
    pub poll_timeout: Duration,
    pub min_delay: Duration,
    pub line_length: usize,
    pub prefix: String,
}

impl Default for OutboundOptions {
    fn default() -> Self {
        Self {
            name: "say-queue".into(),
            capacity: 100,
            poll_timeout: Duration::from_secs(2),
            min_delay: Duration::from_millis(800),
            line_length: 128,
            prefix: String::new(),
        }
    }
}

pub struct OutboundQueue {
    tx: Mutex<Option<Sender<String>>>,
    working: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl OutboundQueue {
    pub fn start(sink: Arc<dyn LineSink>, options: OutboundOptions) -> Result<Self, EngineError> {
        let (tx, rx) = channel::bounded(options.capacity.max(1));
        let working = Arc::new(AtomicBool::new(true));
        let name = options.name.clone();

        let worker = {
            let working = working.clone();
            thread::Builder::new()
                .name(options.name.clone())
                .spawn(move || worker_loop(rx, sink, options, working))
                .map_err(EngineError::Spawn)?
        };

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            working,
            worker: Mutex::new(Some(worker)),
            name,
        })
    }

    /// Queues `text` for delivery. Returns `false` if it was dropped.
    pub fn enqueue(&self, text: impl Into<String>) -> bool {
        if !self.working.load(Ordering::Acquire) {
            return false;
        }
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        match tx.try_send(text.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                warn!(queue = %self.name, text = %text, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.tx.lock().as_ref().map_or(0, Sender::len)
    }

    pub fn is_running(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    /// Stops the worker and joins it. Queued messages are abandoned.
    pub fn shutdown(&self) {
        self.working.store(false, Ordering::Release);
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!(queue = %self.name, "Outbound worker panicked");
            }
        }
    }
}

impl Drop for OutboundQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Receiver<String>,
    sink: Arc<dyn LineSink>,
    options: OutboundOptions,
    working: Arc<AtomicBool>,
) {
    info!(queue = %options.name, "Outbound worker started");
    while working.load(Ordering::Acquire) {
        let message = match rx.recv_timeout(options.poll_timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => {
                trace!(queue = %options.name, "Nothing to send");
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let prefixed = text::prefix_text(&[options.prefix.as_str()], &message);
        for line in text::wrap(&text::strip_colors(&prefixed), options.line_length) {
            if let Err(err) = sink.send_line(&line) {
                warn!(queue = %options.name, error = %err, "Failed to send line");
            }
            if !working.load(Ordering::Acquire) {
                break;
            }
            thread::sleep(options.min_delay);
        }
    }
    let abandoned = rx.len();
    if abandoned > 0 {
        debug!(queue = %options.name, abandoned, "Outbound worker abandoning messages");
    }
    info!(queue = %options.name, "Outbound worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(Instant, String)>>,
    }

    impl LineSink for Recorder {
        fn send_line(&self, line: &str) -> Result<(), EngineError> {
            self.lines.lock().push((Instant::now(), line.to_string()));
            Ok(())
        }
    }

    fn options(delay_ms: u64) -> OutboundOptions {
        OutboundOptions {
            name: "test-queue".into(),
            poll_timeout: Duration::from_millis(20),
            min_delay: Duration::from_millis(delay_ms),
            ..Default::default()
        }
    }

    fn wait_for(recorder: &Recorder, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.lines.lock().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_lines_are_sent_in_order_with_min_delay() {
        let recorder = Arc::new(Recorder::default());
        let queue = OutboundQueue::start(recorder.clone(), options(50)).unwrap();
        for i in 0..4 {
            assert!(queue.enqueue(format!("line {i}")));
        }
        wait_for(&recorder, 4);
        queue.shutdown();

        let lines = recorder.lines.lock();
        let texts: Vec<_> = lines.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(texts, ["line 0", "line 1", "line 2", "line 3"]);
        for pair in lines.windows(2) {
            assert!(pair[1].0.duration_since(pair[0].0) >= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_long_text_is_wrapped_and_prefixed() {
        let recorder = Arc::new(Recorder::default());
        let queue = OutboundQueue::start(
            recorder.clone(),
            OutboundOptions {
                line_length: 16,
                prefix: "[pm]".into(),
                ..options(1)
            },
        )
        .unwrap();
        queue.enqueue("^1hello there general kenobi");
        wait_for(&recorder, 2);
        queue.shutdown();

        let lines: Vec<_> = recorder.lines.lock().iter().map(|(_, l)| l.clone()).collect();
        assert_eq!(lines, ["[pm] hello there", "general kenobi"]);
    }

    #[test]
    fn test_shutdown_does_not_hang_and_rejects_new_messages() {
        let recorder = Arc::new(Recorder::default());
        let queue = OutboundQueue::start(recorder, options(10)).unwrap();
        let started = Instant::now();
        queue.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!queue.is_running());
        assert!(!queue.enqueue("late"));
    }

    #[test]
    fn test_enqueue_never_blocks_when_full() {
        let slow = |_: &str| -> Result<(), EngineError> {
            thread::sleep(Duration::from_millis(200));
            Ok(())
        };
        let queue = OutboundQueue::start(
            Arc::new(slow),
            OutboundOptions {
                capacity: 1,
                ..options(1)
            },
        )
        .unwrap();
        let started = Instant::now();
        let accepted = (0..10).filter(|i| queue.enqueue(format!("{i}"))).count();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(accepted < 10);
    }
}
