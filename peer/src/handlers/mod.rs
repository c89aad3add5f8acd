//! Dispatch handlers for the protocol modes this peer reacts to

pub mod entry;
pub mod message;

pub use entry::{handle_absence, handle_answer, handle_entry, handle_exit};
pub use message::{handle_confirmation, handle_message};

use crate::inbox::Inbox;
use crate::peers::PeerTable;
use ipmsg::{DispatchTable, Mode};
use std::sync::Arc;

/// Build the peer's dispatch table
pub fn build_table(
    peers: Arc<PeerTable>,
    inbox: Arc<Inbox>,
    auto_reply: Option<String>,
    debug: bool,
) -> DispatchTable {
    let mut table = DispatchTable::new();
    table.set_debug(debug);

    let p = peers.clone();
    table.register(Mode::BR_ENTRY, move |record, engine| handle_entry(record, engine, &p));
    let p = peers.clone();
    table.register(Mode::ANSENTRY, move |record, _| handle_answer(record, &p));
    let p = peers.clone();
    table.register(Mode::BR_ABSENCE, move |record, _| handle_absence(record, &p));
    table.register(Mode::BR_EXIT, move |record, _| handle_exit(record, &peers));

    let i = inbox.clone();
    table.register(Mode::SENDMSG, move |record, engine| {
        handle_message(record, engine, &i, auto_reply.as_deref())
    });
    table.register(Mode::RECVMSG, move |record, _| handle_confirmation(record, &inbox));

    table
}
