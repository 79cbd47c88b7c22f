#![forbid(unsafe_code)]

//! Native console surface contract.
//!
//! The translator never talks to an OS directly. Everything it needs from
//! the console is expressed by [`ConsoleSurface`]: one atomic state snapshot,
//! cursor/attribute setters, a character fill, cursor visibility, and
//! non-blocking access to pending input records.
//!
//! # Design Notes
//!
//! - All coordinates on this side of the boundary are 0-indexed and signed.
//!   ANSI one-based values are converted by the dispatcher, never here.
//! - Methods take `&self`: the native API is handle-based, so implementors
//!   provide their own interior synchronization and are shared via `Arc`.
//! - A failed native call is reported as an [`io::Error`]; use [`os_error`]
//!   to build one from an optional OS error code.

use std::io;

use bitflags::bitflags;

use crate::attributes::AttributeBits;

/// A zero-based cell coordinate (`x` = column, `y` = row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    #[inline]
    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Offset by a signed delta, saturating at the `i16` bounds.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i16, dy: i16) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

/// Visible window rectangle inside the screen buffer (inclusive edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowRect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

/// Point-in-time read of the console state.
///
/// Fetched fresh for every command that depends on it; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsoleSnapshot {
    /// Screen buffer dimensions in cells.
    pub size: Coord,
    /// Current cursor position.
    pub cursor: Coord,
    /// Attribute bits applied to subsequently written characters.
    pub attributes: AttributeBits,
    /// Visible window within the buffer.
    pub window: WindowRect,
    /// Largest window the console could display.
    pub max_window: Coord,
}

bitflags! {
    /// Native control-key state carried by a key record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ControlKeyState: u32 {
        const RIGHT_ALT_PRESSED  = 0x0001;
        const LEFT_ALT_PRESSED   = 0x0002;
        const RIGHT_CTRL_PRESSED = 0x0004;
        const LEFT_CTRL_PRESSED  = 0x0008;
        const SHIFT_PRESSED      = 0x0010;
        const NUMLOCK_ON         = 0x0020;
        const SCROLLLOCK_ON      = 0x0040;
        const CAPSLOCK_ON        = 0x0080;
        const ENHANCED_KEY       = 0x0100;
    }
}

bitflags! {
    /// Logical modifiers with left/right variants collapsed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt key (either side).
        const ALT   = 0b0010;
        /// Control key (either side).
        const CTRL  = 0b0100;
    }
}

impl From<ControlKeyState> for Modifiers {
    fn from(state: ControlKeyState) -> Self {
        let mut mods = Self::empty();
        mods.set(Self::SHIFT, state.contains(ControlKeyState::SHIFT_PRESSED));
        mods.set(
            Self::ALT,
            state.intersects(ControlKeyState::LEFT_ALT_PRESSED | ControlKeyState::RIGHT_ALT_PRESSED),
        );
        mods.set(
            Self::CTRL,
            state.intersects(
                ControlKeyState::LEFT_CTRL_PRESSED | ControlKeyState::RIGHT_CTRL_PRESSED,
            ),
        );
        mods
    }
}

/// Native virtual key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const PRIOR: Self = Self(0x21);
    pub const NEXT: Self = Self(0x22);
    pub const END: Self = Self(0x23);
    pub const HOME: Self = Self(0x24);
    pub const LEFT: Self = Self(0x25);
    pub const UP: Self = Self(0x26);
    pub const RIGHT: Self = Self(0x27);
    pub const DOWN: Self = Self(0x28);
    pub const INSERT: Self = Self(0x2D);
    pub const DELETE: Self = Self(0x2E);
    pub const F1: Self = Self(0x70);
    pub const F2: Self = Self(0x71);
    pub const F3: Self = Self(0x72);
    pub const F4: Self = Self(0x73);
    pub const F5: Self = Self(0x74);
    pub const F6: Self = Self(0x75);
    pub const F7: Self = Self(0x76);
    pub const F8: Self = Self(0x77);
    pub const F9: Self = Self(0x78);
    pub const F10: Self = Self(0x79);
    pub const F11: Self = Self(0x7A);
    pub const F12: Self = Self(0x7B);

    /// Function key `F<n>` for `n` in `1..=24`.
    #[must_use]
    pub const fn function(n: u8) -> Option<Self> {
        if n >= 1 && n <= 24 {
            Some(Self(Self::F1.0 + n as u16 - 1))
        } else {
            None
        }
    }
}

/// A native key event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyRecord {
    /// `true` for key-down, `false` for key-up.
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key: VirtualKey,
    pub scan_code: u16,
    /// UTF-16 code unit, `0` when the key produces no character.
    pub unicode_char: u16,
    pub control_state: ControlKeyState,
}

impl KeyRecord {
    /// A key-down record for a non-printable virtual key.
    #[must_use]
    pub const fn key(virtual_key: VirtualKey) -> Self {
        Self {
            key_down: true,
            repeat_count: 1,
            virtual_key,
            scan_code: 0,
            unicode_char: 0,
            control_state: ControlKeyState::empty(),
        }
    }

    /// A key-down record carrying a character.
    ///
    /// Characters outside the Basic Multilingual Plane do not fit one code
    /// unit and are stored as `0`.
    #[must_use]
    pub fn char(ch: char) -> Self {
        let unit = u16::try_from(u32::from(ch)).unwrap_or(0);
        Self {
            unicode_char: unit,
            ..Self::key(VirtualKey::default())
        }
    }

    /// Replace the control-key state.
    #[must_use]
    pub const fn with_state(mut self, state: ControlKeyState) -> Self {
        self.control_state = state;
        self
    }

    /// Mark the record as a key-up event.
    #[must_use]
    pub const fn released(mut self) -> Self {
        self.key_down = false;
        self
    }

    /// Collapsed shift/alt/control state.
    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        Modifiers::from(self.control_state)
    }
}

/// Native input event type code for key records.
pub const KEY_EVENT: u16 = 0x0001;

/// One native input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRecord {
    /// Keyboard event.
    Key(KeyRecord),
    /// Mouse, focus, menu or buffer-size event; carried but not translated.
    Other { event_type: u16 },
}

impl InputRecord {
    /// Native event type code.
    #[must_use]
    pub const fn event_type(&self) -> u16 {
        match self {
            Self::Key(_) => KEY_EVENT,
            Self::Other { event_type } => *event_type,
        }
    }
}

/// The primitives a native console must provide.
pub trait ConsoleSurface: Send + Sync {
    /// Read cursor, attributes and geometry as one atomic snapshot.
    fn snapshot(&self) -> io::Result<ConsoleSnapshot>;

    /// Move the cursor to an absolute, zero-based position.
    fn set_cursor_position(&self, position: Coord) -> io::Result<()>;

    /// Set the attribute bits used for subsequent character writes.
    fn set_text_attribute(&self, attributes: AttributeBits) -> io::Result<()>;

    /// Write `len` copies of `ch` starting at `origin`, wrapping across rows.
    ///
    /// Returns the number of cells actually written.
    fn fill_output_character(&self, ch: char, len: u32, origin: Coord) -> io::Result<u32>;

    /// Show or hide the cursor.
    fn set_cursor_visible(&self, visible: bool) -> io::Result<()>;

    /// Number of pending input records. Never blocks.
    fn pending_input_events(&self) -> io::Result<usize>;

    /// Remove and return up to `max` pending input records.
    fn read_input(&self, max: usize) -> io::Result<Vec<InputRecord>>;
}

/// Build the error for a native call that reported failure.
///
/// Uses the OS error code when one was reported, otherwise a generic
/// invalid-argument error.
#[must_use]
pub fn os_error(code: Option<i32>) -> io::Error {
    match code {
        Some(code) if code != 0 => io::Error::from_raw_os_error(code),
        _ => io::Error::from(io::ErrorKind::InvalidInput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_variants_collapse() {
        let right = Modifiers::from(ControlKeyState::RIGHT_ALT_PRESSED);
        let left = Modifiers::from(ControlKeyState::LEFT_ALT_PRESSED);
        assert_eq!(right, Modifiers::ALT);
        assert_eq!(left, Modifiers::ALT);

        let ctrl = Modifiers::from(
            ControlKeyState::RIGHT_CTRL_PRESSED | ControlKeyState::LEFT_CTRL_PRESSED,
        );
        assert_eq!(ctrl, Modifiers::CTRL);
    }

    #[test]
    fn lock_lights_are_not_modifiers() {
        let state = ControlKeyState::CAPSLOCK_ON
            | ControlKeyState::NUMLOCK_ON
            | ControlKeyState::ENHANCED_KEY;
        assert!(Modifiers::from(state).is_empty());
    }

    #[test]
    fn function_keys_map_to_virtual_codes() {
        assert_eq!(VirtualKey::function(1), Some(VirtualKey::F1));
        assert_eq!(VirtualKey::function(12), Some(VirtualKey::F12));
        assert_eq!(VirtualKey::function(0), None);
        assert_eq!(VirtualKey::function(25), None);
    }

    #[test]
    fn char_records_outside_bmp_store_zero() {
        assert_eq!(KeyRecord::char('a').unicode_char, u16::from(b'a'));
        assert_eq!(KeyRecord::char('🎉').unicode_char, 0);
    }

    #[test]
    fn os_error_prefers_reported_code() {
        assert_eq!(os_error(Some(5)).raw_os_error(), Some(5));
        assert_eq!(os_error(None).kind(), io::ErrorKind::InvalidInput);
        assert_eq!(os_error(Some(0)).kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn coord_offset_saturates() {
        assert_eq!(Coord::new(3, 4).offset(-1, 2), Coord::new(2, 6));
        assert_eq!(Coord::new(i16::MAX, i16::MIN).offset(1, -1), Coord::new(i16::MAX, i16::MIN));
    }
}
