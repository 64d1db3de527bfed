//! One live Frostbite RCON socket.
//!
//! Writes happen on the caller's thread under a lock. A reader thread owns
//! the read half: replies are matched to pending commands by sequence number,
//! server-initiated packets are acknowledged with `OK` and pushed onto the
//! inbound queue. Any read error or EOF marks the link dead and fails every
//! pending command.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use gamewarden_protocols::frostbite::SEQUENCE_MASK;
use gamewarden_protocols::{classify_reply, CommandError, Origin, Packet};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::Link;
use crate::command::Command;
use crate::error::{EngineError, NetworkError};
use crate::inbound::InboundQueue;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Resends of an unanswered command before it fails with a timeout.
    pub command_retries: u32,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            command_retries: 0,
        }
    }
}

struct PendingCommand {
    request: Packet,
    issued_at: Instant,
    retries_left: u32,
    reply: Sender<Vec<String>>,
}

struct LinkState {
    writer: Mutex<TcpStream>,
    pending: Mutex<HashMap<u32, PendingCommand>>,
    alive: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl LinkState {
    fn write(&self, packet: &Packet) -> Result<(), EngineError> {
        let bytes = packet.encode().map_err(NetworkError::from)?;
        let mut writer = self.writer.lock();
        writer.write_all(&bytes).map_err(NetworkError::from)?;
        trace!(sequence = packet.sequence, words = ?packet.words, "Packet sent");
        Ok(())
    }

    fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let failed = {
                let mut pending = self.pending.lock();
                let count = pending.len();
                pending.clear();
                count
            };
            warn!(failed, "RCON link lost");
        }
    }
}

pub struct RconLink {
    peer: String,
    state: Arc<LinkState>,
    sequence: AtomicU32,
    reader: Mutex<Option<JoinHandle<()>>>,
    options: LinkOptions,
}

impl RconLink {
    pub fn connect(
        address: &str,
        options: LinkOptions,
        inbound: InboundQueue,
    ) -> Result<Self, EngineError> {
        let addr = address
            .to_socket_addrs()
            .map_err(NetworkError::from)?
            .next()
            .ok_or_else(|| {
                NetworkError::Io(std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    format!("{address} did not resolve"),
                ))
            })?;
        let stream =
            TcpStream::connect_timeout(&addr, options.connect_timeout).map_err(NetworkError::from)?;
        stream.set_nodelay(true).map_err(NetworkError::from)?;
        let read_half = stream.try_clone().map_err(NetworkError::from)?;

        let state = Arc::new(LinkState {
            writer: Mutex::new(stream),
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            last_activity: Mutex::new(Instant::now()),
        });

        let reader = {
            let state = state.clone();
            thread::Builder::new()
                .name("rcon-reader".into())
                .spawn(move || read_loop(read_half, state, inbound))
                .map_err(EngineError::Spawn)?
        };

        info!(peer = %addr, "RCON link established");
        Ok(Self {
            peer: addr.to_string(),
            state,
            sequence: AtomicU32::new(0),
            reader: Mutex::new(Some(reader)),
            options,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn pending_commands(&self) -> usize {
        self.state.pending.lock().len()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK
    }
}

impl Link for RconLink {
    fn command(&self, command: &Command) -> Result<Vec<String>, EngineError> {
        if !self.is_alive() {
            return Err(NetworkError::Closed.into());
        }
        let sequence = self.next_sequence();
        let request = Packet::request(sequence, command.words().iter().cloned());
        let (tx, rx) = channel::bounded(1);
        self.state.pending.lock().insert(
            sequence,
            PendingCommand {
                request: request.clone(),
                issued_at: Instant::now(),
                retries_left: self.options.command_retries,
                reply: tx,
            },
        );
        if let Err(err) = self.state.write(&request) {
            self.state.pending.lock().remove(&sequence);
            self.state.mark_dead();
            return Err(err);
        }

        loop {
            match rx.recv_timeout(self.options.command_timeout) {
                Ok(words) => {
                    debug!(command = %command.name(), reply = ?words, "Command answered");
                    return classify_reply(command.name(), &words).map_err(EngineError::from);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NetworkError::Closed.into());
                }
                Err(RecvTimeoutError::Timeout) => {
                    let resend = {
                        let mut pending = self.state.pending.lock();
                        match pending.get_mut(&sequence) {
                            Some(entry) if entry.retries_left > 0 => {
                                entry.retries_left -= 1;
                                Some(entry.request.clone())
                            }
                            Some(entry) => {
                                warn!(
                                    command = %command.name(),
                                    waited = ?entry.issued_at.elapsed(),
                                    "Command timed out"
                                );
                                pending.remove(&sequence);
                                None
                            }
                            None => None,
                        }
                    };
                    match resend {
                        Some(request) => {
                            debug!(command = %command.name(), "Resending unanswered command");
                            self.state.write(&request)?;
                        }
                        None => {
                            return Err(CommandError::Timeout(command.name().to_string()).into());
                        }
                    }
                }
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    fn idle_for(&self) -> Duration {
        self.state.last_activity.lock().elapsed()
    }

    fn close(&self) {
        self.state.alive.store(false, Ordering::Release);
        if let Err(err) = self.state.writer.lock().shutdown(Shutdown::Both) {
            trace!(error = %err, "Socket already shut down");
        }
        self.state.pending.lock().clear();
        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                error!("RCON reader thread panicked");
            }
        }
        debug!(peer = %self.peer, "RCON link closed");
    }
}

impl Drop for RconLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(mut stream: TcpStream, state: Arc<LinkState>, inbound: InboundQueue) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK * 4);
    let mut chunk = [0u8; READ_CHUNK];

    'read: while state.alive.load(Ordering::Acquire) {
        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                info!("Server closed the RCON connection");
                break;
            }
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if state.alive.load(Ordering::Acquire) {
                    warn!(error = %err, "RCON read failed");
                }
                break;
            }
        };
        buf.extend_from_slice(&chunk[..read]);
        *state.last_activity.lock() = Instant::now();

        loop {
            let packet = match Packet::decode(&mut buf) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "Undecodable RCON stream");
                    break 'read;
                }
            };
            handle_packet(packet, &state, &inbound);
        }
    }
    state.mark_dead();
}

fn handle_packet(packet: Packet, state: &LinkState, inbound: &InboundQueue) {
    if packet.is_response {
        if packet.origin != Origin::Client {
            trace!(sequence = packet.sequence, "Ignoring reply to a server packet");
            return;
        }
        match state.pending.lock().remove(&packet.sequence) {
            Some(pending) => {
                // The waiter may have given up already.
                let _ = pending.reply.send(packet.words);
            }
            None => debug!(sequence = packet.sequence, "Reply for unknown command"),
        }
        return;
    }

    trace!(words = ?packet.words, "Server event received");
    if let Err(err) = state.write(&packet.response(["OK"])) {
        warn!(error = %err, "Failed to acknowledge server event");
    }
    inbound.push(packet);
}
