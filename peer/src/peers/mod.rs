//! Known peers, keyed by `user@address`

use chrono::{DateTime, Local};
use ipmsg::{Flag, MessageRecord};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
pub struct Peer {
    pub key: String,
    pub addr: SocketAddr,
    pub user: String,
    pub nickname: String,
    pub display_name: String,
    pub absent: bool,
    pub encrypted: bool,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry or entry answer. Returns true for a peer not seen before.
    pub fn upsert(&self, record: &MessageRecord) -> bool {
        let (Some(key), Some(addr)) = (record.identity_key(), record.origin) else {
            return false;
        };
        let now = record.received_at.unwrap_or_else(Local::now);

        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        let first_seen = peers.get(&key).map_or(now, |p| p.first_seen);
        let is_new = !peers.contains_key(&key);

        peers.insert(
            key.clone(),
            Peer {
                key,
                addr,
                user: record.user.clone(),
                nickname: record.nickname.clone(),
                display_name: record.display_name(),
                absent: record.command.has(Flag::ABSENCE),
                encrypted: record.encrypted,
                first_seen,
                last_seen: now,
            },
        );

        is_new
    }

    /// Update the absence state of a known peer
    pub fn set_absent(&self, record: &MessageRecord) -> bool {
        let Some(key) = record.identity_key() else {
            return false;
        };

        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        match peers.get_mut(&key) {
            Some(peer) => {
                peer.absent = record.command.has(Flag::ABSENCE);
                peer.last_seen = record.received_at.unwrap_or_else(Local::now);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, record: &MessageRecord) -> Option<Peer> {
        let key = record.identity_key()?;
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }

    /// Address of the peer whose nickname, user or display name is `name`.
    ///
    /// Among several matches the most recently seen wins.
    pub fn find(&self, name: &str) -> Option<SocketAddr> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        peers
            .values()
            .filter(|p| p.nickname == name || p.user == name || p.display_name == name)
            .max_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| b.key.cmp(&a.key)))
            .map(|p| p.addr)
    }

    /// Peers sorted by display name
    pub fn list(&self) -> Vec<Peer> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Peer> = peers.values().cloned().collect();
        list.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        list
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
