//! Presence handlers: entry, entry answer, absence and exit

use crate::peers::PeerTable;
use anyhow::{Context, Result};
use ipmsg::{Command, Engine, MessageRecord, Mode};
use tracing::{debug, info};

/// Handle BR_ENTRY
///
/// Records the peer and answers with our own nickname and group
pub fn handle_entry(record: &MessageRecord, engine: &Engine, peers: &PeerTable) -> Result<()> {
    let addr = record.origin.context("BR_ENTRY without origin")?;

    if peers.upsert(record) {
        info!("{} joined from {}", record.display_name(), addr);
    }

    engine
        .send(addr, &engine.my_info(), Command::from(Mode::ANSENTRY))
        .with_context(|| format!("Failed to answer BR_ENTRY from {}", addr))?;

    Ok(())
}

/// Handle ANSENTRY
pub fn handle_answer(record: &MessageRecord, peers: &PeerTable) -> Result<()> {
    if peers.upsert(record) {
        info!("Found {} ({})", record.display_name(), record.identity_key().unwrap_or_default());
    }
    Ok(())
}

/// Handle BR_ABSENCE
pub fn handle_absence(record: &MessageRecord, peers: &PeerTable) -> Result<()> {
    if !peers.set_absent(record) {
        debug!("Absence notice from unknown peer {}", record.display_name());
    }
    Ok(())
}

/// Handle BR_EXIT
pub fn handle_exit(record: &MessageRecord, peers: &PeerTable) -> Result<()> {
    if let Some(peer) = peers.remove(record) {
        info!("{} left", peer.display_name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipmsg::EngineConfig;

    fn engine(nickname: &str, group: &str) -> Engine {
        Engine::bind(EngineConfig {
            nickname: nickname.into(),
            group: group.into(),
            user: nickname.into(),
            host: "test".into(),
            bind_address: "127.0.0.1".into(),
            port: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_entry_is_answered() {
        let alice = engine("alice", "eng");
        let bob = engine("bob", "sales");
        let peers = PeerTable::new();

        let entry = MessageRecord::parse(
            "1:1:alice:test:1:alice\0eng\0",
            Some(alice.local_endpoint().unwrap()),
        );
        handle_entry(&entry, &bob, &peers).unwrap();
        assert_eq!(peers.find("alice"), Some(alice.local_endpoint().unwrap()));

        let answer = alice.receive().unwrap();
        assert_eq!(answer.command.mode(), Mode::ANSENTRY);
        assert_eq!(answer.display_name(), "bob@sales");
    }

    #[test]
    fn test_entry_without_origin_fails() {
        let bob = engine("bob", "sales");
        let peers = PeerTable::new();
        let entry = MessageRecord::parse("1:1:alice:test:1:alice\0eng\0", None);

        assert!(handle_entry(&entry, &bob, &peers).is_err());
        assert_eq!(peers.len(), 0);
    }

    #[test]
    fn test_answer_then_exit() {
        let peers = PeerTable::new();
        let origin = Some("10.1.1.1:2425".parse().unwrap());

        let answer = MessageRecord::parse("1:1:carol:pc:3:carol\0ops\0", origin);
        handle_answer(&answer, &peers).unwrap();
        assert_eq!(peers.len(), 1);

        handle_exit(&MessageRecord::parse("1:2:carol:pc:2:carol\0ops\0", origin), &peers).unwrap();
        assert_eq!(peers.len(), 0);
    }
}
