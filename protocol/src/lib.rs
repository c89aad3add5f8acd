//! IP Messenger protocol engine
//!
//! Command bitfields, the colon separated message record, mode dispatch
//! tables and a UDP engine that ties them together.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod record;

pub use command::{Command, Flag, Mode};
pub use config::{DEFAULT_PORT, EngineConfig};
pub use dispatch::{DispatchTable, Handler};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use record::MessageRecord;
