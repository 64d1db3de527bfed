//! Scripted Frostbite 2 server.
//!
//! Every accepted connection gets a thread that decodes client packets,
//! records requests and answers them from the reply table. Server events are
//! written to all open connections; the client's acknowledgements are kept.

use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use gamewarden_protocols::frostbite::SEQUENCE_MASK;
use gamewarden_protocols::{Origin, Packet};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(10);

struct Shared {
    password: Mutex<String>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    silent: Mutex<HashSet<String>>,
    follow_ups: Mutex<HashMap<String, Vec<Vec<String>>>>,
    commands: Mutex<Vec<Vec<String>>>,
    acks: Mutex<Vec<Packet>>,
    clients: Mutex<Vec<TcpStream>>,
    accepted: AtomicU32,
    sequence: AtomicU32,
    running: AtomicBool,
}

impl Shared {
    fn reply_for(&self, words: &[String]) -> Option<Vec<String>> {
        let name = words.first().map(String::as_str).unwrap_or_default();
        if self.silent.lock().contains(name) {
            return None;
        }
        if name == "login.plainText" {
            let ok = words.get(1).map(String::as_str) == Some(self.password.lock().as_str());
            return Some(vec![if ok { "OK" } else { "InvalidPassword" }.to_string()]);
        }
        if let Some(reply) = self.replies.lock().get(name) {
            return Some(reply.clone());
        }
        Some(vec!["OK".to_string()])
    }

    fn event_packet(&self, words: Vec<String>) -> Packet {
        Packet {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK,
            origin: Origin::Server,
            is_response: false,
            words,
        }
    }
}

pub struct FakeServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl FakeServer {
    /// Listens on an ephemeral localhost port.
    pub fn start(password: &str) -> io::Result<Self> {
        Self::bind("127.0.0.1:0", password)
    }

    pub fn bind(address: &str, password: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let mut replies = HashMap::new();
        replies.insert(
            "version".to_string(),
            words(&["OK", "BF3", "1149977"]),
        );
        replies.insert(
            "admin.listPlayers".to_string(),
            player_list(&[]),
        );
        replies.insert(
            "serverInfo".to_string(),
            words(&["OK", "gamewarden test", "0", "16", "ConquestLarge0", "MP_001", "0", "2"]),
        );
        replies.insert(
            "punkBuster.isActive".to_string(),
            words(&["OK", "false"]),
        );

        let shared = Arc::new(Shared {
            password: Mutex::new(password.to_string()),
            replies: Mutex::new(replies),
            silent: Mutex::new(HashSet::new()),
            follow_ups: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
            accepted: AtomicU32::new(0),
            sequence: AtomicU32::new(0),
            running: AtomicBool::new(true),
        });

        let acceptor = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("fake-server".into())
                .spawn(move || accept_loop(listener, shared))?
        };
        info!(%addr, "Fake Frostbite server listening");
        Ok(Self {
            addr,
            shared,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_password(&self, password: &str) {
        *self.shared.password.lock() = password.to_string();
    }

    /// Answers `command` with `reply` (status word first) from now on.
    pub fn set_reply(&self, command: &str, reply: &[&str]) {
        self.shared
            .replies
            .lock()
            .insert(command.to_string(), words(reply));
    }

    /// Sets the `admin.listPlayers` reply. Rows are `(name, guid, team, squad)`.
    pub fn set_players(&self, players: &[(&str, &str, u8, u8)]) {
        self.shared
            .replies
            .lock()
            .insert("admin.listPlayers".to_string(), player_list(players));
    }

    /// Never answer `command`.
    pub fn ignore(&self, command: &str) {
        self.shared.silent.lock().insert(command.to_string());
    }

    /// Sends `event` on the same connection right after the next reply to
    /// `command`.
    pub fn push_after(&self, command: &str, event: &[&str]) {
        self.shared
            .follow_ups
            .lock()
            .entry(command.to_string())
            .or_default()
            .push(words(event));
    }

    /// Sends a server event to every connected client.
    pub fn push_event(&self, event: &[&str]) -> usize {
        let packet = self.shared.event_packet(words(event));
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "Cannot encode server event");
                return 0;
            }
        };
        let mut clients = self.shared.clients.lock();
        clients.retain_mut(|client| client.write_all(&bytes).is_ok());
        trace!(event = ?event, clients = clients.len(), "Server event pushed");
        clients.len()
    }

    /// Closes every client connection, as a crashing server would.
    pub fn drop_clients(&self) {
        for client in self.shared.clients.lock().drain(..) {
            let _ = client.shutdown(Shutdown::Both);
        }
        debug!("Dropped all client connections");
    }

    /// All requests received so far.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.shared.commands.lock().clone()
    }

    /// Requests whose first word is `name`.
    pub fn commands_named(&self, name: &str) -> Vec<Vec<String>> {
        self.shared
            .commands
            .lock()
            .iter()
            .filter(|c| c.first().map(String::as_str) == Some(name))
            .cloned()
            .collect()
    }

    /// Acknowledgements the client sent for pushed events.
    pub fn acks(&self) -> Vec<Packet> {
        self.shared.acks.lock().clone()
    }

    pub fn connections_accepted(&self) -> u32 {
        self.shared.accepted.load(Ordering::Acquire)
    }

    pub fn connected_clients(&self) -> usize {
        self.shared.clients.lock().len()
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.drop_clients();
        if let Some(handle) = self.acceptor.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|w| w.to_string()).collect()
}

fn player_list(players: &[(&str, &str, u8, u8)]) -> Vec<String> {
    let mut out = words(&["OK", "4", "name", "guid", "teamId", "squadId"]);
    out.push(players.len().to_string());
    for (name, guid, team, squad) in players {
        out.extend([
            name.to_string(),
            guid.to_string(),
            team.to_string(),
            squad.to_string(),
        ]);
    }
    out
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut sessions = Vec::new();
    while shared.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "Client connected");
                if let Err(err) = start_session(stream, &shared, &mut sessions) {
                    warn!(error = %err, "Could not start client session");
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!(error = %err, "Accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    for session in sessions {
        let _ = session.join();
    }
}

fn start_session(
    stream: TcpStream,
    shared: &Arc<Shared>,
    sessions: &mut Vec<JoinHandle<()>>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    shared.clients.lock().push(stream.try_clone()?);
    shared.accepted.fetch_add(1, Ordering::AcqRel);
    let shared = shared.clone();
    let handle = thread::Builder::new()
        .name("fake-session".into())
        .spawn(move || session_loop(stream, shared))?;
    sessions.push(handle);
    Ok(())
}

fn session_loop(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut buf = BytesMut::with_capacity(8192);
    let mut chunk = [0u8; 4096];
    loop {
        let read = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        buf.extend_from_slice(&chunk[..read]);
        loop {
            match Packet::decode(&mut buf) {
                Ok(Some(packet)) => {
                    if !handle(&mut stream, &shared, packet) {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Client sent garbage");
                    return;
                }
            }
        }
    }
    debug!("Client session ended");
}

fn handle(stream: &mut TcpStream, shared: &Shared, packet: Packet) -> bool {
    if packet.is_response {
        shared.acks.lock().push(packet);
        return true;
    }
    trace!(words = ?packet.words, "Command received");
    shared.commands.lock().push(packet.words.clone());
    let Some(reply) = shared.reply_for(&packet.words) else {
        return true;
    };
    let name = packet.words.first().cloned().unwrap_or_default();
    let follow_ups = shared.follow_ups.lock().remove(&name).unwrap_or_default();
    let packets = std::iter::once(packet.response(reply))
        .chain(follow_ups.into_iter().map(|event| shared.event_packet(event)));
    for packet in packets {
        match packet.encode() {
            Ok(bytes) => {
                if stream.write_all(&bytes).is_err() {
                    return false;
                }
            }
            Err(err) => warn!(error = %err, "Cannot encode packet"),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_packet(stream: &mut TcpStream, buf: &mut BytesMut) -> Packet {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(packet) = Packet::decode(buf).unwrap() {
                return packet;
            }
            let read = stream.read(&mut chunk).unwrap();
            assert!(read > 0, "server hung up");
            buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn roundtrip(stream: &mut TcpStream, request: &Packet) -> Packet {
        stream.write_all(&request.encode().unwrap()).unwrap();
        read_packet(stream, &mut BytesMut::new())
    }

    #[test]
    fn test_login_and_default_replies() {
        let server = FakeServer::start("secret").unwrap();
        let mut stream = TcpStream::connect(server.addr()).unwrap();

        let reply = roundtrip(&mut stream, &Packet::request(1, ["login.plainText", "nope"]));
        assert_eq!(reply.words, ["InvalidPassword"]);
        assert!(reply.is_response);
        assert_eq!(reply.sequence, 1);

        let reply = roundtrip(&mut stream, &Packet::request(2, ["login.plainText", "secret"]));
        assert_eq!(reply.words, ["OK"]);

        let reply = roundtrip(&mut stream, &Packet::request(3, ["version"]));
        assert_eq!(reply.words[0], "OK");
        assert_eq!(server.commands_named("login.plainText").len(), 2);
    }

    #[test]
    fn test_follow_up_event_trails_reply() {
        let server = FakeServer::start("").unwrap();
        server.push_after("admin.eventsEnabled", &["player.onJoin", "Joe", "EA_1"]);
        let mut stream = TcpStream::connect(server.addr()).unwrap();

        let request = Packet::request(7, ["admin.eventsEnabled", "true"]);
        stream.write_all(&request.encode().unwrap()).unwrap();
        let mut buf = BytesMut::new();
        let reply = read_packet(&mut stream, &mut buf);
        assert_eq!(reply.words, ["OK"]);
        let event = read_packet(&mut stream, &mut buf);
        assert!(!event.is_response);
        assert_eq!(event.words, ["player.onJoin", "Joe", "EA_1"]);

        let reply = roundtrip(&mut stream, &Packet::request(8, ["serverInfo"]));
        assert_eq!(reply.words[5], "MP_001");
    }

    #[test]
    fn test_push_event_reaches_client() {
        let server = FakeServer::start("").unwrap();
        let mut stream = TcpStream::connect(server.addr()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || server.connected_clients() == 1));

        assert_eq!(server.push_event(&["player.onJoin", "Joe", "EA_1"]), 1);
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 1024];
        let packet = loop {
            if let Some(packet) = Packet::decode(&mut buf).unwrap() {
                break packet;
            }
            let read = stream.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..read]);
        };
        assert_eq!(packet.origin, Origin::Server);
        assert!(!packet.is_response);
        assert_eq!(packet.words, ["player.onJoin", "Joe", "EA_1"]);
    }
}
