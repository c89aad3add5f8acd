//! Message delivery and confirmation handlers

use crate::inbox::Inbox;
use anyhow::{Context, Result};
use ipmsg::{Command, Engine, Flag, MessageRecord, Mode};
use tracing::{debug, warn};

/// Handle SENDMSG
///
/// Logs the message, confirms it when the sender asked for SENDCHECK and
/// sends the configured auto reply
pub fn handle_message(
    record: &MessageRecord,
    engine: &Engine,
    inbox: &Inbox,
    auto_reply: Option<&str>,
) -> Result<()> {
    let message = inbox.push(record);
    println!(
        "[{}] {}: {}",
        message.received_at.format("%H:%M:%S"),
        message.from,
        message.body
    );

    // Broadcast copies are neither confirmed nor answered
    if record.command.has(Flag::BROADCAST) {
        return Ok(());
    }

    let addr = record.origin.context("SENDMSG without origin")?;

    if record.command.has(Flag::SENDCHECK) {
        engine
            .send(addr, &record.sequence.to_string(), Command::from(Mode::RECVMSG))
            .with_context(|| format!("Failed to confirm packet {} to {}", record.sequence, addr))?;
    }

    if let Some(reply) = auto_reply {
        if !record.command.has(Flag::AUTORET) {
            engine
                .send(addr, reply, Command::from(Mode::SENDMSG).with(Flag::AUTORET))
                .with_context(|| format!("Failed to auto reply to {}", addr))?;
        }
    }

    Ok(())
}

/// Handle RECVMSG
pub fn handle_confirmation(record: &MessageRecord, inbox: &Inbox) -> Result<()> {
    let Ok(sequence) = record.option.trim().parse::<u64>() else {
        warn!("Malformed RECVMSG from {}: {:?}", record.display_name(), record.option);
        return Ok(());
    };

    let from = record.origin.context("RECVMSG without origin")?;

    if inbox.confirm(sequence, from) {
        println!("Delivered to {} ({})", record.display_name(), from);
    } else {
        debug!("Unexpected confirmation for packet {} from {}", sequence, from);
    }
    Ok(())
}
