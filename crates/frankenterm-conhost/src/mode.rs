#![forbid(unsafe_code)]

//! Console input modes and a raw-mode guard.
//!
//! A cooked console echoes, buffers whole lines and handles Ctrl+C itself.
//! Translating key events into escape sequences needs every key as it is
//! pressed, so callers switch the input handle into raw mode first.

use std::io;

use bitflags::bitflags;

bitflags! {
    /// Native console input-mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConsoleMode: u32 {
        const PROCESSED_INPUT = 0x0001;
        const LINE_INPUT      = 0x0002;
        const ECHO_INPUT      = 0x0004;
        const WINDOW_INPUT    = 0x0008;
        const MOUSE_INPUT     = 0x0010;
        const INSERT_MODE     = 0x0020;
        const QUICK_EDIT_MODE = 0x0040;
    }
}

impl ConsoleMode {
    /// Mode of a freshly opened interactive console.
    #[must_use]
    pub const fn cooked() -> Self {
        Self::PROCESSED_INPUT
            .union(Self::LINE_INPUT)
            .union(Self::ECHO_INPUT)
            .union(Self::MOUSE_INPUT)
            .union(Self::INSERT_MODE)
            .union(Self::QUICK_EDIT_MODE)
    }

    /// This mode with echo, line buffering and input processing disabled.
    #[must_use]
    pub const fn raw(self) -> Self {
        self.difference(
            Self::ECHO_INPUT
                .union(Self::LINE_INPUT)
                .union(Self::PROCESSED_INPUT),
        )
    }

    /// Whether this mode delivers keys unprocessed.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        !self.intersects(
            Self::ECHO_INPUT
                .union(Self::LINE_INPUT)
                .union(Self::PROCESSED_INPUT),
        )
    }
}

/// Get/set access to the console input mode.
pub trait ConsoleModeControl {
    /// Current input mode.
    fn console_mode(&self) -> io::Result<ConsoleMode>;

    /// Replace the input mode.
    fn set_console_mode(&self, mode: ConsoleMode) -> io::Result<()>;
}

/// RAII guard that puts the console into raw mode and restores the
/// original mode on drop.
#[derive(Debug)]
pub struct RawModeGuard<'a, C: ConsoleModeControl + ?Sized> {
    console: &'a C,
    original: ConsoleMode,
}

impl<'a, C: ConsoleModeControl + ?Sized> RawModeGuard<'a, C> {
    /// Save the current mode and switch to its raw variant.
    ///
    /// # Errors
    ///
    /// Propagates failures of the mode query or update; the console is left
    /// untouched if the query fails.
    pub fn enter(console: &'a C) -> io::Result<Self> {
        let original = console.console_mode()?;
        console.set_console_mode(original.raw())?;
        crate::debug!(original = original.bits(), "console entered raw mode");
        Ok(Self { console, original })
    }

    /// The mode that will be restored.
    #[must_use]
    pub fn original(&self) -> ConsoleMode {
        self.original
    }
}

impl<C: ConsoleModeControl + ?Sized> Drop for RawModeGuard<'_, C> {
    fn drop(&mut self) {
        // Best-effort restore; errors during cleanup are ignored.
        let _ = self.console.set_console_mode(self.original);
    }
}
