#![forbid(unsafe_code)]

//! ANSI/ECMA-48 translation for native console surfaces.
//!
//! `frankenterm-conhost` sits between a program that speaks escape sequences
//! and a console that does not. Output CSI commands are executed as
//! discrete native calls (cursor moves, attribute changes, character fills)
//! and native key records are turned back into the byte sequences a
//! terminal would have sent.
//!
//! # Primary responsibilities
//!
//! - **Parser**: split one CSI command into its final byte and parameters.
//! - **Attributes**: fold SGR values into the native 16-bit attribute field.
//! - **Dispatch**: run cursor, erase, SGR and cursor-visibility commands.
//! - **Clear ranges**: size the linear fill behind an erase command.
//! - **Keys**: encode key records as arrow/function-key/character bytes.
//! - **Streams**: `io::Write` / `io::Read` adapters over the above.
//!
//! # Design principles
//!
//! - **Surface-agnostic**: everything goes through [`ConsoleSurface`];
//!   [`VirtualConsole`] is the in-memory implementation.
//! - **Serialized**: output commands and input polls each hold their own
//!   lock for their full duration and share nothing mutable.
//! - **No retries**: a failed native call is reported once, never repeated.
//! - **`#![forbid(unsafe_code)]`**: safety enforced at compile time.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod attributes;
pub mod clear;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod logging;
pub mod mode;
pub mod parser;
pub mod stream;
pub mod virtual_console;

#[cfg(feature = "crossterm")]
pub mod crossterm_bridge;

pub use attributes::{AttributeBits, BaseColor, translate};
pub use clear::count_cells;
pub use config::{ConhostConfig, DEFAULT_MAX_COMMAND_LEN};
pub use console::{
    ConsoleSnapshot, ConsoleSurface, ControlKeyState, Coord, InputRecord, KEY_EVENT, KeyRecord,
    Modifiers, VirtualKey, WindowRect, os_error,
};
pub use dispatch::{DispatchStats, OutputDispatcher};
pub use error::{ConsoleError, DispatchError};
pub use keys::{InputEncoder, InputStats, encode_key};
pub use mode::{ConsoleMode, ConsoleModeControl, RawModeGuard};
pub use parser::{CSI, ParsedCommand, parse_command};
pub use stream::{ConsoleReader, ConsoleWriter};
pub use virtual_console::{SurfaceCall, SurfaceOp, VCell, VirtualConsole, VirtualConsoleWriter};

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, debug_span, trace, warn};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Guarded state here is counters and plain cell data, which stay
/// consistent even if a holder unwound mid-update.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
