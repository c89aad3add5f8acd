//! UDP transport engine
//!
//! Owns the socket and local identity, numbers and sends outgoing records,
//! and runs every registered dispatch table against each inbound record.

use crate::command::{Command, Mode};
use crate::config::EngineConfig;
use crate::dispatch::DispatchTable;
use crate::error::{EngineError, Result};
use crate::record::{MessageRecord, NUL};
use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Receive buffer size (largest UDP datagram)
pub const BUF_LEN: usize = 65535;

/// Version stamped on outgoing records
pub const WIRE_VERSION: u32 = 1;

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    tables: RwLock<Vec<Arc<DispatchTable>>>,
    packet_count: AtomicU64,
}

impl Engine {
    /// Resolve the configured address and bind a broadcast-capable UDP socket
    pub fn bind(config: EngineConfig) -> Result<Self> {
        let service = config.service();
        let bind_err = |source: io::Error| EngineError::Bind {
            addr: service.clone(),
            source,
        };

        let addr = service
            .to_socket_addrs()
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| {
                bind_err(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "no address resolved",
                ))
            })?;

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(bind_err)?;
        // Entry and exit announcements go to the broadcast address
        if addr.is_ipv4() {
            socket.set_broadcast(true).map_err(bind_err)?;
        }
        socket.bind(&addr.into()).map_err(bind_err)?;
        let socket: UdpSocket = socket.into();

        info!(
            "IPMSG engine bound to {}",
            socket.local_addr().map_err(bind_err)?
        );

        Ok(Self {
            config,
            socket: RwLock::new(Some(Arc::new(socket))),
            tables: RwLock::new(Vec::new()),
            packet_count: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a table; tables run in registration order
    pub fn register_dispatch_table(&self, table: DispatchTable) {
        debug!("Registered dispatch table {:?}", table);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(table));
    }

    /// Next packet number: unix seconds plus a per-engine counter
    pub fn next_sequence(&self) -> u64 {
        let count = self.packet_count.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now().timestamp().max(0) as u64;
        now + count
    }

    /// `nickname\0group\0`, the option of entry-family messages
    pub fn my_info(&self) -> String {
        format!("{}{}{}{}", self.config.nickname, NUL, self.config.group, NUL)
    }

    pub fn build_outgoing(
        &self,
        dest: SocketAddr,
        payload: &str,
        command: Command,
    ) -> MessageRecord {
        MessageRecord {
            version: WIRE_VERSION,
            sequence: self.next_sequence(),
            user: self.config.user.clone(),
            host: self.config.host.clone(),
            command,
            option: payload.to_string(),
            origin: Some(dest),
            ..Default::default()
        }
    }

    /// Build a record and send it as one datagram. No retry.
    pub fn send(&self, dest: SocketAddr, payload: &str, command: Command) -> Result<()> {
        let record = self.build_outgoing(dest, payload, command);
        self.send_record(&record)
    }

    /// Send an already built record to its `origin`.
    ///
    /// A closed engine fails with [`EngineError::NotOpen`] before anything
    /// is written, a record without an endpoint with
    /// [`EngineError::NoDestination`]. Write failures are
    /// [`EngineError::Transport`].
    pub fn send_record(&self, record: &MessageRecord) -> Result<()> {
        let socket = self.socket()?;
        let dest = record.origin.ok_or(EngineError::NoDestination)?;

        socket
            .send_to(&record.to_bytes(), dest)
            .map_err(|source| EngineError::Transport { dest, source })?;

        debug!(
            "Sent {} seq={} to {}",
            record.command.mode(),
            record.sequence,
            dest
        );
        Ok(())
    }

    /// Send `BR_ENTRY` with our nickname and group to the LAN
    pub fn broadcast_entry(&self) -> Result<()> {
        self.send(self.broadcast_addr(), &self.my_info(), Command::from(Mode::BR_ENTRY))
    }

    /// Send `BR_EXIT` to the LAN
    pub fn broadcast_exit(&self) -> Result<()> {
        self.send(self.broadcast_addr(), &self.my_info(), Command::from(Mode::BR_EXIT))
    }

    fn broadcast_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::BROADCAST, self.config.port))
    }

    /// Block for one datagram, parse it and dispatch it.
    ///
    /// Tables run in order and stop at the first handler error, which comes
    /// back as [`EngineError::Handler`] carrying the parsed record.
    pub fn receive(&self) -> Result<MessageRecord> {
        let socket = self.socket().map_err(|_| EngineError::Closed)?;

        let mut buf = vec![0u8; BUF_LEN];
        let received = socket.recv_from(&mut buf);
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        let (len, from) = received.map_err(EngineError::Receive)?;

        let record = MessageRecord::from_bytes(trim_padding(&buf[..len]), Some(from));
        debug!(
            "Received {} seq={} from {} ({} bytes)",
            record.command.mode(),
            record.sequence,
            from,
            len
        );

        let tables = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for table in &tables {
            if let Err(source) = table.dispatch(&record, self) {
                return Err(EngineError::Handler {
                    record: Box::new(record),
                    source,
                });
            }
        }

        Ok(record)
    }

    pub fn local_endpoint(&self) -> Result<SocketAddr> {
        self.socket()?.local_addr().map_err(EngineError::LocalAddr)
    }

    /// Release the socket and wake a pending `receive`.
    ///
    /// Closing twice fails with [`EngineError::NotOpen`].
    pub fn close(&self) -> Result<()> {
        let socket = self
            .socket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EngineError::NotOpen)?;

        if let Ok(local) = socket.local_addr() {
            // An empty datagram to ourselves unblocks recv_from
            if let Err(e) = socket.send_to(&[], wake_addr(local)) {
                debug!("Failed to wake receiver on {}: {}", local, e);
            }
            info!("IPMSG engine on {} closed", local);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::NotOpen)
    }
}

/// Drop the NUL tail a fixed-size buffer or a sloppy sender leaves behind
fn trim_padding(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

fn wake_addr(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Flag;
    use anyhow::Context;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn loopback(nickname: &str, group: &str, user: &str) -> Engine {
        Engine::bind(EngineConfig {
            nickname: nickname.into(),
            group: group.into(),
            user: user.into(),
            host: format!("{}-host", user),
            bind_address: "127.0.0.1".into(),
            port: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let engine = loopback("a", "g", "u");
        let local = engine.local_endpoint().unwrap();
        assert_eq!(local.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(local.port(), 0);
    }

    #[test]
    fn test_bind_port_in_use() {
        let first = loopback("a", "g", "u");
        let port = first.local_endpoint().unwrap().port();

        let err = Engine::bind(EngineConfig {
            bind_address: "127.0.0.1".into(),
            port,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::Bind { .. }));
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let engine = loopback("a", "g", "u");
        let first = engine.next_sequence();
        let second = engine.next_sequence();
        let third = engine.next_sequence();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_build_outgoing() {
        let engine = loopback("alice", "eng", "alice");
        let dest: SocketAddr = "10.0.0.2:2425".parse().unwrap();
        let record = engine.build_outgoing(dest, "hello", Command::from(Mode::SENDMSG));

        assert_eq!(record.version, 1);
        assert_eq!(record.user, "alice");
        assert_eq!(record.host, "alice-host");
        assert_eq!(record.option, "hello");
        assert_eq!(record.origin, Some(dest));
        assert!(record.received_at.is_none());
        assert!(record.sequence > 0);
    }

    #[test]
    fn test_my_info() {
        let engine = loopback("bob", "sales", "bob");
        assert_eq!(engine.my_info(), "bob\0sales\0");
    }

    #[test]
    fn test_entry_answer_scenario() {
        let a = loopback("alice", "eng", "alice");
        let b = loopback("bob", "sales", "bob");

        let mut table = DispatchTable::new();
        table.register(Mode::BR_ENTRY, |record, engine| {
            let dest = record.origin.context("entry without origin")?;
            engine.send(dest, &engine.my_info(), Command::from(Mode::ANSENTRY))?;
            Ok(())
        });
        b.register_dispatch_table(table);

        a.send(b.local_endpoint().unwrap(), "", Command::from(Mode::BR_ENTRY))
            .unwrap();

        let entry = b.receive().unwrap();
        assert_eq!(entry.command.mode(), Mode::BR_ENTRY);
        assert_eq!(entry.origin, Some(a.local_endpoint().unwrap()));

        let answer = a.receive().unwrap();
        assert_eq!(answer.command.mode(), Mode::ANSENTRY);
        assert_eq!(answer.display_name(), "bob@sales");
        assert_eq!(answer.user, "bob");
    }

    #[test]
    fn test_sendcheck_confirmation_scenario() {
        let a = loopback("alice", "eng", "alice");
        let b = loopback("bob", "sales", "bob");

        let mut table = DispatchTable::new();
        table.register(Mode::SENDMSG, |record, engine| {
            if record.command.has(Flag::SENDCHECK) {
                let dest = record.origin.context("message without origin")?;
                engine.send(dest, &record.sequence.to_string(), Command::from(Mode::RECVMSG))?;
            }
            Ok(())
        });
        b.register_dispatch_table(table);

        let outgoing = a.build_outgoing(
            b.local_endpoint().unwrap(),
            "lunch at noon?",
            Command::from(Mode::SENDMSG).with(Flag::SENDCHECK),
        );
        a.send_record(&outgoing).unwrap();

        let delivered = b.receive().unwrap();
        assert_eq!(delivered.option, "lunch at noon?");
        assert_eq!(delivered.sequence, outgoing.sequence);

        let confirmation = a.receive().unwrap();
        assert_eq!(confirmation.command.mode(), Mode::RECVMSG);
        assert_eq!(confirmation.option, outgoing.sequence.to_string());
    }

    #[test]
    fn test_handler_error_returns_record() {
        let a = loopback("alice", "eng", "alice");
        let b = loopback("bob", "sales", "bob");

        let mut table = DispatchTable::new();
        table.register(Mode::SENDMSG, |_, _| anyhow::bail!("inbox full"));
        b.register_dispatch_table(table);

        a.send(b.local_endpoint().unwrap(), "hi", Command::from(Mode::SENDMSG))
            .unwrap();

        let err = b.receive().unwrap_err();
        let record = err.record().expect("record kept on handler error");
        assert_eq!(record.option, "hi");
        assert_eq!(record.user, "alice");
        assert!(err.to_string().contains("inbox full"));
    }

    #[test]
    fn test_tables_run_in_order_and_stop_on_error() {
        let a = loopback("alice", "eng", "alice");
        let b = loopback("bob", "sales", "bob");
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            let log = log.clone();
            let mut table = DispatchTable::new();
            table.register(Mode::SENDMSG, move |_, _| {
                log.lock().unwrap().push(name);
                if fail {
                    anyhow::bail!("{} failed", name);
                }
                Ok(())
            });
            b.register_dispatch_table(table);
        }

        a.send(b.local_endpoint().unwrap(), "x", Command::from(Mode::SENDMSG))
            .unwrap();

        assert!(b.receive().is_err());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unknown_mode_is_received() {
        let a = loopback("alice", "eng", "alice");
        let b = loopback("bob", "sales", "bob");

        let mut table = DispatchTable::new();
        table.register(Mode::SENDMSG, |_, _| anyhow::bail!("should not run"));
        b.register_dispatch_table(table);

        a.send(b.local_endpoint().unwrap(), "?", Command::from_u32(0xee))
            .unwrap();
        let record = b.receive().unwrap();
        assert_eq!(record.command.mode(), Mode::from_u8(0xee));
    }

    #[test]
    fn test_trailing_padding_is_trimmed() {
        let b = loopback("bob", "sales", "bob");
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(b"1:10:carol:pc:1:carol\0dev\0\0\0\0", b.local_endpoint().unwrap())
            .unwrap();

        let record = b.receive().unwrap();
        assert_eq!(record.option, "carol\0dev");
        assert_eq!(record.nickname, "carol");
        assert_eq!(record.group, "dev");
        assert_eq!(record.identity_key(), Some(format!("carol@{}", raw.local_addr().unwrap())));
    }

    #[test]
    fn test_close_unblocks_receive() {
        let engine = Arc::new(loopback("a", "g", "u"));

        let receiver = {
            let engine = engine.clone();
            thread::spawn(move || engine.receive())
        };
        thread::sleep(Duration::from_millis(100));

        engine.close().unwrap();
        let result = receiver.join().unwrap();
        assert!(matches!(result, Err(EngineError::Closed)));

        assert!(matches!(engine.close(), Err(EngineError::NotOpen)));
        assert!(matches!(engine.local_endpoint(), Err(EngineError::NotOpen)));
        assert!(matches!(engine.receive(), Err(EngineError::Closed)));

        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(matches!(
            engine.send(dest, "", Command::from(Mode::NOOPERATION)),
            Err(EngineError::NotOpen)
        ));
    }

    #[test]
    fn test_send_oversized_is_transport_error() {
        let a = loopback("alice", "eng", "alice");
        let dest = loopback("bob", "sales", "bob").local_endpoint().unwrap();

        let payload = "x".repeat(70_000);
        let err = a.send(dest, &payload, Command::from(Mode::SENDMSG)).unwrap_err();
        assert!(matches!(err, EngineError::Transport { dest: d, .. } if d == dest));
    }

    #[test]
    fn test_send_record_without_destination() {
        let a = loopback("alice", "eng", "alice");
        let mut record = a.build_outgoing(
            "127.0.0.1:9".parse().unwrap(),
            "hi",
            Command::from(Mode::SENDMSG),
        );
        record.origin = None;

        assert!(matches!(a.send_record(&record), Err(EngineError::NoDestination)));
    }

    #[test]
    fn test_trim_padding() {
        assert_eq!(trim_padding(b"abc\0\0"), b"abc");
        assert_eq!(trim_padding(b"\0\0"), b"");
        assert_eq!(trim_padding(b"a\0b"), b"a\0b");
    }
}
