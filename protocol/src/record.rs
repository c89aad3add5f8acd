//! Message records: one datagram, parsed or about to be sent
//!
//! Wire layout is six colon separated fields:
//! `version:sequence:user:host:command:option`. Only the first five colons
//! split; the option keeps any further colons verbatim.

use crate::command::{Command, Flag};
use chrono::{DateTime, Local};
use std::fmt;
use std::net::SocketAddr;

/// Field separator on the wire
pub const SEPARATOR: char = ':';

/// Separator inside entry-family options (`nickname\0group\0`)
pub const NUL: char = '\0';

const FIELD_COUNT: usize = 6;

const FALLBACK_NICK: &str = "noname";
const FALLBACK_GROUP: &str = "nogroup";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRecord {
    /// Protocol version
    pub version: u32,
    /// Sender-chosen packet number, echoed back by confirmations
    pub sequence: u64,
    pub user: String,
    pub host: String,
    pub command: Command,
    /// Mode dependent payload
    pub option: String,

    /// Derived from `option` for entry-family modes only
    pub nickname: String,
    pub group: String,
    pub encrypted: bool,

    /// Source of an inbound record, destination of an outbound one
    pub origin: Option<SocketAddr>,
    /// Local clock at parse time
    pub received_at: Option<DateTime<Local>>,
}

impl MessageRecord {
    /// Parse a wire string.
    ///
    /// Never fails: non-numeric numbers become zero and missing fields stay
    /// empty, so foreign or future peers are still heard.
    pub fn parse(raw: &str, origin: Option<SocketAddr>) -> Self {
        let mut fields = raw.splitn(FIELD_COUNT, SEPARATOR);
        let mut next = || fields.next().unwrap_or_default();

        let version = next().parse().unwrap_or(0);
        let sequence = next().parse().unwrap_or(0);
        let user = next().to_string();
        let host = next().to_string();
        let command = Command::from_u32(next().parse().unwrap_or(0));
        let option = next().to_string();

        let mut record = Self {
            version,
            sequence,
            user,
            host,
            command,
            option,
            origin,
            received_at: Some(Local::now()),
            ..Default::default()
        };
        record.update_nick();
        record
    }

    /// Parse raw datagram bytes, replacing invalid UTF-8
    pub fn from_bytes(bytes: &[u8], origin: Option<SocketAddr>) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes), origin)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Fill `nickname`, `group` and `encrypted` from the option.
    ///
    /// Only entry-family records are touched; a NUL inside a message body
    /// means nothing.
    pub fn update_nick(&mut self) {
        if !self.command.mode().is_entry_family() {
            return;
        }

        if let Some((nick, group)) = self.option.split_once(NUL) {
            self.nickname = nick.to_string();
            self.group = group.trim_matches(NUL).to_string();
        }

        if self.command.has(Flag::ENCRYPT) {
            self.encrypted = true;
        }
    }

    /// `nickname@group`, falling back to user/host and then to placeholders
    pub fn display_name(&self) -> String {
        let nick = [self.nickname.as_str(), self.user.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_NICK);
        let group = [self.group.as_str(), self.host.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_GROUP);
        format!("{}@{}", nick, group)
    }

    /// `user@address` lookup key; `None` until an endpoint is attached
    pub fn identity_key(&self) -> Option<String> {
        self.origin.map(|addr| format!("{}@{}", self.user, addr))
    }
}

impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.version, self.sequence, self.user, self.host, self.command, self.option
        )
    }
}
