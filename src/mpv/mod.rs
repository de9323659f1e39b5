//! MPV control - spawns an external mpv and drives it over JSON IPC.
//!
//! Architecture:
//! - `sanitize.rs` - Target/title validation before anything reaches a command line
//! - `process.rs` - MPV binary detection, process spawning and reaping
//! - `ipc.rs` - Per-command IPC connections (Named Pipes on Windows, Unix Sockets elsewhere)
//! - `events.rs` - Long-lived event connection and line framing
//! - `ticker.rs` - Periodic position/duration polling
//! - `protocol.rs` - JSON command/response types and serialization
//! - `client.rs` - High-level session tying the above together

mod client;
mod events;
mod ipc;
mod process;
mod protocol;
mod sanitize;
mod signal;
mod ticker;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use client::{MpvPlayer, PlayerError};
pub(crate) use client::{percent, redact_url};
pub use events::{EventCallback, EventListener, LineSplitter, OBSERVED_PROPERTIES};
pub use ipc::{IpcClient, IpcError, TransportError};
pub use process::{
  build_args, cleanup_ipc, find_mpv, header_fields, ipc_path, spawn_player, wait_for_socket,
  PlayerProcess, ProcessError,
};
pub use protocol::{Chapter, MpvCommand, MpvEvent, MpvMessage, MpvResponse, PropertyValue};
pub use sanitize::{sanitize_target, sanitize_title, SanitizeError};
pub use signal::{exit_signal, ExitNotifier, ExitSignal};
pub use ticker::ProgressTicker;
