#![forbid(unsafe_code)]

//! In-memory native console for testing.
//!
//! `VirtualConsole` models the native console surface the translator drives:
//! a screen buffer of cells with attribute bits, a cursor, cursor
//! visibility, an input mode and a queue of pending input records. It
//! implements [`ConsoleSurface`] and [`ConsoleModeControl`], records every
//! call it receives, and can be told to fail a specific call once.
//!
//! # Invariants
//!
//! 1. **Cursor always in bounds**: `0 <= cursor.x < width`,
//!    `0 <= cursor.y < height`. Positioning outside the buffer is rejected
//!    with `InvalidInput`, like the native API, and leaves the cursor as is.
//! 2. **Buffer always fully populated**: `cells.len() == width * height`.
//! 3. **Fills never change attributes**: only the character of a cell is
//!    overwritten by [`ConsoleSurface::fill_output_character`].
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Injected failure | [`VirtualConsole::fail_next`] | Next matching call returns the OS error |
//! | Fill origin outside buffer | Caller bug | `InvalidInput`, nothing written |
//! | Fill past buffer end | Long fill | Clamped; written count reported |
//! | Call log full | Long-lived console | Oldest recorded call is dropped |

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::attributes::AttributeBits;
use crate::console::{
    ConsoleSnapshot, ConsoleSurface, Coord, InputRecord, KeyRecord, WindowRect, os_error,
};
use crate::lock_unpoisoned;
use crate::mode::{ConsoleMode, ConsoleModeControl};

/// Attribute bits of a freshly created console: white on black.
pub const DEFAULT_ATTRIBUTES: AttributeBits = AttributeBits::FOREGROUND_RGB;

/// Calls kept by the call log before the oldest are dropped.
pub const DEFAULT_CALL_LOG_CAPACITY: usize = 4096;

/// A single cell of the virtual screen buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VCell {
    pub ch: char,
    pub attributes: AttributeBits,
}

impl Default for VCell {
    fn default() -> Self {
        Self {
            ch: ' ',
            attributes: DEFAULT_ATTRIBUTES,
        }
    }
}

/// Surface operations that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceOp {
    Snapshot,
    SetCursorPosition,
    SetTextAttribute,
    FillOutputCharacter,
    SetCursorVisible,
    PendingInput,
    ReadInput,
    ConsoleMode,
    SetConsoleMode,
}

/// A recorded surface call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Snapshot,
    SetCursorPosition(Coord),
    SetTextAttribute(AttributeBits),
    FillOutputCharacter { ch: char, len: u32, origin: Coord },
    SetCursorVisible(bool),
    PendingInput,
    ReadInput(usize),
    ConsoleMode,
    SetConsoleMode(ConsoleMode),
}

impl SurfaceCall {
    /// Whether the call can change console state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::SetCursorPosition(_)
                | Self::SetTextAttribute(_)
                | Self::FillOutputCharacter { .. }
                | Self::SetCursorVisible(_)
                | Self::SetConsoleMode(_)
        )
    }
}

#[derive(Debug)]
struct State {
    width: i16,
    height: i16,
    cells: Vec<VCell>,
    cursor: Coord,
    attributes: AttributeBits,
    cursor_visible: bool,
    mode: ConsoleMode,
    max_window: Coord,
    input: VecDeque<InputRecord>,
    calls: VecDeque<SurfaceCall>,
    call_capacity: usize,
    failures: Vec<(SurfaceOp, Option<i32>)>,
}

impl State {
    fn contains(&self, c: Coord) -> bool {
        c.x >= 0 && c.y >= 0 && c.x < self.width && c.y < self.height
    }

    fn idx(&self, c: Coord) -> usize {
        c.y as usize * self.width as usize + c.x as usize
    }

    /// Record the call and consume a matching injected failure, if any.
    fn enter(&mut self, op: SurfaceOp, call: SurfaceCall) -> io::Result<()> {
        if self.call_capacity > 0 {
            if self.calls.len() == self.call_capacity {
                self.calls.pop_front();
            }
            self.calls.push_back(call);
        }
        if let Some(pos) = self.failures.iter().position(|(o, _)| *o == op) {
            let (_, code) = self.failures.remove(pos);
            return Err(os_error(code));
        }
        Ok(())
    }

    fn put_char(&mut self, ch: char) {
        match ch {
            '\n' => {
                self.cursor.x = 0;
                self.linefeed();
            }
            '\r' => self.cursor.x = 0,
            ch if ch.is_control() => {}
            ch => {
                let idx = self.idx(self.cursor);
                self.cells[idx] = VCell {
                    ch,
                    attributes: self.attributes,
                };
                self.cursor.x += 1;
                if self.cursor.x >= self.width {
                    self.cursor.x = 0;
                    self.linefeed();
                }
            }
        }
    }

    fn linefeed(&mut self) {
        if self.cursor.y + 1 < self.height {
            self.cursor.y += 1;
            return;
        }
        let width = self.width as usize;
        self.cells.drain(..width);
        self.cells.extend(std::iter::repeat_n(VCell::default(), width));
    }
}

/// In-memory console surface.
///
/// # Example
///
/// ```
/// use frankenterm_conhost::console::{ConsoleSurface, Coord};
/// use frankenterm_conhost::virtual_console::VirtualConsole;
///
/// let console = VirtualConsole::new(80, 25);
/// console.set_cursor_position(Coord::new(4, 9)).unwrap();
/// assert_eq!(console.cursor(), Coord::new(4, 9));
/// assert!(console.set_cursor_position(Coord::new(80, 0)).is_err());
/// ```
#[derive(Debug)]
pub struct VirtualConsole {
    state: Mutex<State>,
}

impl VirtualConsole {
    /// Create a console with a `width` x `height` buffer.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is not positive.
    #[must_use]
    pub fn new(width: i16, height: i16) -> Self {
        assert!(width > 0 && height > 0, "console dimensions must be positive");
        Self {
            state: Mutex::new(State {
                width,
                height,
                cells: vec![VCell::default(); width as usize * height as usize],
                cursor: Coord::default(),
                attributes: DEFAULT_ATTRIBUTES,
                cursor_visible: true,
                mode: ConsoleMode::cooked(),
                max_window: Coord::new(width, height),
                input: VecDeque::new(),
                calls: VecDeque::new(),
                call_capacity: DEFAULT_CALL_LOG_CAPACITY,
                failures: Vec::new(),
            }),
        }
    }

    /// Override the reported maximum window size.
    #[must_use]
    pub fn with_max_window(self, max_window: Coord) -> Self {
        lock_unpoisoned(&self.state).max_window = max_window;
        self
    }

    /// Keep at most `capacity` recorded calls; `0` turns recording off.
    #[must_use]
    pub fn with_call_log_capacity(self, capacity: usize) -> Self {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.call_capacity = capacity;
            while state.calls.len() > capacity {
                state.calls.pop_front();
            }
        }
        self
    }

    /// Buffer size as `(width, height)`.
    #[must_use]
    pub fn size(&self) -> Coord {
        let state = lock_unpoisoned(&self.state);
        Coord::new(state.width, state.height)
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> Coord {
        lock_unpoisoned(&self.state).cursor
    }

    /// Move the cursor without recording a call (test setup).
    ///
    /// The position is clamped into the buffer.
    pub fn place_cursor(&self, position: Coord) {
        let mut state = lock_unpoisoned(&self.state);
        state.cursor = Coord::new(
            position.x.clamp(0, state.width - 1),
            position.y.clamp(0, state.height - 1),
        );
    }

    /// Current attribute bits.
    #[must_use]
    pub fn attributes(&self) -> AttributeBits {
        lock_unpoisoned(&self.state).attributes
    }

    /// Whether the cursor is visible.
    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        lock_unpoisoned(&self.state).cursor_visible
    }

    /// Cell at `(x, y)`, if inside the buffer.
    #[must_use]
    pub fn cell_at(&self, x: i16, y: i16) -> Option<VCell> {
        let state = lock_unpoisoned(&self.state);
        let c = Coord::new(x, y);
        state.contains(c).then(|| state.cells[state.idx(c)])
    }

    /// Character at `(x, y)`, if inside the buffer.
    #[must_use]
    pub fn char_at(&self, x: i16, y: i16) -> Option<char> {
        self.cell_at(x, y).map(|cell| cell.ch)
    }

    /// Text of row `y` with trailing spaces removed.
    #[must_use]
    pub fn row_text(&self, y: i16) -> String {
        let state = lock_unpoisoned(&self.state);
        if y < 0 || y >= state.height {
            return String::new();
        }
        let start = state.idx(Coord::new(0, y));
        let row: String = state.cells[start..start + state.width as usize]
            .iter()
            .map(|cell| cell.ch)
            .collect();
        row.trim_end_matches(' ').to_string()
    }

    /// All rows joined with `\n`.
    #[must_use]
    pub fn screen_text(&self) -> String {
        let height = self.size().y;
        (0..height)
            .map(|y| self.row_text(y))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Print text at the cursor with the current attributes.
    ///
    /// `\n` moves to the start of the next line, `\r` to the start of the
    /// current one; other control characters are dropped. Writing past the
    /// last column wraps, and wrapping past the last row scrolls.
    pub fn print(&self, text: &str) {
        let mut state = lock_unpoisoned(&self.state);
        for ch in text.chars() {
            state.put_char(ch);
        }
    }

    /// Queue an input record.
    pub fn push_input(&self, record: InputRecord) {
        lock_unpoisoned(&self.state).input.push_back(record);
    }

    /// Queue a key record.
    pub fn push_key(&self, key: KeyRecord) {
        self.push_input(InputRecord::Key(key));
    }

    /// Make the next call of `op` fail with the given OS error code
    /// (`None`: a failure without an OS code).
    pub fn fail_next(&self, op: SurfaceOp, code: Option<i32>) {
        lock_unpoisoned(&self.state).failures.push((op, code));
    }

    /// Calls received so far, oldest first, up to the log capacity.
    #[must_use]
    pub fn calls(&self) -> Vec<SurfaceCall> {
        lock_unpoisoned(&self.state).calls.iter().cloned().collect()
    }

    /// Calls received so far that can change console state.
    #[must_use]
    pub fn mutations(&self) -> Vec<SurfaceCall> {
        lock_unpoisoned(&self.state)
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock_unpoisoned(&self.state).calls.clear();
    }

    /// An `io::Write` handle that prints into this console.
    #[must_use]
    pub fn writer(self: &Arc<Self>) -> VirtualConsoleWriter {
        VirtualConsoleWriter {
            console: Arc::clone(self),
            pending: Vec::new(),
        }
    }
}

impl ConsoleSurface for VirtualConsole {
    fn snapshot(&self) -> io::Result<ConsoleSnapshot> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(SurfaceOp::Snapshot, SurfaceCall::Snapshot)?;
        Ok(ConsoleSnapshot {
            size: Coord::new(state.width, state.height),
            cursor: state.cursor,
            attributes: state.attributes,
            window: WindowRect {
                left: 0,
                top: 0,
                right: state.width - 1,
                bottom: state.height - 1,
            },
            max_window: state.max_window,
        })
    }

    fn set_cursor_position(&self, position: Coord) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(
            SurfaceOp::SetCursorPosition,
            SurfaceCall::SetCursorPosition(position),
        )?;
        if !state.contains(position) {
            return Err(os_error(None));
        }
        state.cursor = position;
        Ok(())
    }

    fn set_text_attribute(&self, attributes: AttributeBits) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(
            SurfaceOp::SetTextAttribute,
            SurfaceCall::SetTextAttribute(attributes),
        )?;
        state.attributes = attributes;
        Ok(())
    }

    fn fill_output_character(&self, ch: char, len: u32, origin: Coord) -> io::Result<u32> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(
            SurfaceOp::FillOutputCharacter,
            SurfaceCall::FillOutputCharacter { ch, len, origin },
        )?;
        if !state.contains(origin) {
            return Err(os_error(None));
        }
        let start = state.idx(origin);
        let end = start
            .saturating_add(len as usize)
            .min(state.cells.len());
        for cell in &mut state.cells[start..end] {
            cell.ch = ch;
        }
        Ok(u32::try_from(end - start).unwrap_or(u32::MAX))
    }

    fn set_cursor_visible(&self, visible: bool) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(
            SurfaceOp::SetCursorVisible,
            SurfaceCall::SetCursorVisible(visible),
        )?;
        state.cursor_visible = visible;
        Ok(())
    }

    fn pending_input_events(&self) -> io::Result<usize> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(SurfaceOp::PendingInput, SurfaceCall::PendingInput)?;
        Ok(state.input.len())
    }

    fn read_input(&self, max: usize) -> io::Result<Vec<InputRecord>> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(SurfaceOp::ReadInput, SurfaceCall::ReadInput(max))?;
        let n = max.min(state.input.len());
        Ok(state.input.drain(..n).collect())
    }
}

impl ConsoleModeControl for VirtualConsole {
    fn console_mode(&self) -> io::Result<ConsoleMode> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(SurfaceOp::ConsoleMode, SurfaceCall::ConsoleMode)?;
        Ok(state.mode)
    }

    fn set_console_mode(&self, mode: ConsoleMode) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.enter(SurfaceOp::SetConsoleMode, SurfaceCall::SetConsoleMode(mode))?;
        state.mode = mode;
        Ok(())
    }
}

/// `io::Write` adapter printing into a [`VirtualConsole`].
///
/// UTF-8 sequences split across writes are reassembled; invalid bytes are
/// replaced with U+FFFD.
#[derive(Debug)]
pub struct VirtualConsoleWriter {
    console: Arc<VirtualConsole>,
    pending: Vec<u8>,
}

impl Write for VirtualConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match err.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + bad);
                        }
                        None => {
                            // Incomplete trailing sequence; wait for more bytes.
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        self.console.print(&text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
