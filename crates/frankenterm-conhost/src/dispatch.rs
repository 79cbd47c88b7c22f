#![forbid(unsafe_code)]

//! CSI output command dispatcher.
//!
//! [`OutputDispatcher::handle`] executes one complete CSI command against a
//! [`ConsoleSurface`]. Commands are serialized: the dispatcher holds its
//! lock from parsing until the last surface call returns, so a cursor move
//! that reads a snapshot and then writes a position cannot interleave with
//! another command.
//!
//! # Supported commands
//!
//! | Final | Meaning | Parameters | Parse failure |
//! |-------|---------|------------|---------------|
//! | `m` | Select graphic rendition | SGR values, empty = `0` | error |
//! | `H` `f` | Cursor position | line, column (1-based, default 1) | error |
//! | `A` `B` `C` `D` | Cursor up/down/forward/back | count (default 1) | error |
//! | `J` | Erase in display | mode 0/1/2 | defaults to 0 |
//! | `K` | Erase in line | mode 0/1/2 | defaults to 0 |
//! | `h` `l` | Show/hide cursor | `?25` only | ignored |
//!
//! Anything else is consumed and ignored.

use std::sync::{Arc, Mutex};

use crate::attributes::{self, AttributeBits};
use crate::clear::count_cells;
use crate::config::ConhostConfig;
use crate::console::{ConsoleSurface, Coord};
use crate::error::{ConsoleError, DispatchError};
use crate::lock_unpoisoned;
use crate::parser::{ParsedCommand, parse_command};

/// Private-mode parameter toggling cursor visibility.
const CURSOR_VISIBILITY: &str = "?25";

/// Counters kept by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Commands dispatched, including failed and ignored ones.
    pub commands: u64,
    /// Commands that returned an error.
    pub failures: u64,
    /// Commands that were consumed without touching the console.
    pub ignored: u64,
}

/// What a command did to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    Ignored,
}

/// Executes CSI commands against a console surface.
#[derive(Debug)]
pub struct OutputDispatcher<C: ConsoleSurface + ?Sized> {
    console: Arc<C>,
    config: ConhostConfig,
    stats: Mutex<DispatchStats>,
}

impl<C: ConsoleSurface + ?Sized> OutputDispatcher<C> {
    /// Dispatcher with the default configuration.
    pub fn new(console: Arc<C>) -> Self {
        Self::with_config(console, ConhostConfig::default())
    }

    pub fn with_config(console: Arc<C>, config: ConhostConfig) -> Self {
        Self {
            console,
            config,
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    /// The console this dispatcher drives.
    #[must_use]
    pub fn console(&self) -> &Arc<C> {
        &self.console
    }

    #[must_use]
    pub fn config(&self) -> &ConhostConfig {
        &self.config
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        *lock_unpoisoned(&self.stats)
    }

    /// Execute one CSI command, with or without its `ESC [` introducer.
    ///
    /// Returns the number of bytes consumed, which is always
    /// `bytes.len()`, on success and inside the error alike.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when a numeric parameter of a cursor or
    /// SGR command does not parse, when an SGR value is unsupported, or
    /// when a console call fails. Failed calls are not retried.
    pub fn handle(&self, bytes: &[u8]) -> Result<usize, DispatchError> {
        let consumed = bytes.len();
        let mut stats = lock_unpoisoned(&self.stats);
        stats.commands += 1;

        let Some(command) = parse_command(bytes) else {
            stats.ignored += 1;
            return Ok(consumed);
        };

        let span = crate::debug_span!(
            "csi",
            command = %command.command,
            params = command.parameters.len()
        );
        let _guard = span.enter();

        match self.execute(&command) {
            Ok(Outcome::Applied) => Ok(consumed),
            Ok(Outcome::Ignored) => {
                stats.ignored += 1;
                Ok(consumed)
            }
            Err(err) => {
                stats.failures += 1;
                crate::warn!(error = %err, "console command failed");
                Err(DispatchError::new(consumed, err))
            }
        }
    }

    fn execute(&self, command: &ParsedCommand) -> Result<Outcome, ConsoleError> {
        match command.command {
            'm' => self.select_graphic_rendition(command),
            'H' | 'f' => self.cursor_position(command),
            'A' => self.cursor_relative(command, |n| (0, n.saturating_neg())),
            'B' => self.cursor_relative(command, |n| (0, n)),
            'C' => self.cursor_relative(command, |n| (n, 0)),
            'D' => self.cursor_relative(command, |n| (n.saturating_neg(), 0)),
            'J' => self.erase_in_display(command),
            'K' => self.erase_in_line(command),
            'h' => self.cursor_visibility(command, true),
            'l' => self.cursor_visibility(command, false),
            other => {
                crate::trace!(command = %other, "ignoring unsupported CSI command");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// `m`: fold every SGR value from a zero field, then apply once.
    fn select_graphic_rendition(&self, command: &ParsedCommand) -> Result<Outcome, ConsoleError> {
        // No parameters means a single reset.
        let count = command.parameters.len().max(1);
        let mut field = AttributeBits::empty();
        for index in 0..count {
            let value = command.param_i16_or(index, 0)?;
            field = attributes::translate(field, i64::from(value))?;
        }
        self.console.set_text_attribute(field)?;
        Ok(Outcome::Applied)
    }

    /// `H` / `f`: absolute move. Missing parameters mean 1; explicit values
    /// go to the surface as given, so `0;0H` is rejected there.
    fn cursor_position(&self, command: &ParsedCommand) -> Result<Outcome, ConsoleError> {
        let line = command.param_i16_or(0, 1)?;
        let column = command.param_i16_or(1, 1)?;
        self.console
            .set_cursor_position(Coord::new(column.saturating_sub(1), line.saturating_sub(1)))?;
        Ok(Outcome::Applied)
    }

    /// `A`..`D`: relative move by a count that defaults to 1. An explicit
    /// `0` is a zero-length move.
    fn cursor_relative(
        &self,
        command: &ParsedCommand,
        delta: impl Fn(i16) -> (i16, i16),
    ) -> Result<Outcome, ConsoleError> {
        let n = command.param_i16_or(0, 1)?;
        let (dx, dy) = delta(n);
        self.move_by(dx, dy)?;
        Ok(Outcome::Applied)
    }

    fn move_by(&self, dx: i16, dy: i16) -> Result<(), ConsoleError> {
        let snapshot = self.console.snapshot()?;
        self.console
            .set_cursor_position(snapshot.cursor.offset(dx, dy))?;
        Ok(())
    }

    /// `J`: erase in display. Unparsable modes default to 0.
    fn erase_in_display(&self, command: &ParsedCommand) -> Result<Outcome, ConsoleError> {
        let mode = command.param_i16_lenient(0, 0);
        let snapshot = self.console.snapshot()?;
        let max = snapshot.max_window;
        let screen_end = Coord::new(max.x - 1, max.y - 1);
        let (start, end, cursor) = match mode {
            0 => (snapshot.cursor, screen_end, snapshot.cursor),
            1 => (Coord::new(0, 0), snapshot.cursor, snapshot.cursor),
            2 => (Coord::new(0, 0), screen_end, Coord::new(0, 0)),
            _ => return Ok(Outcome::Ignored),
        };
        self.clear_range(start, end, max)?;
        self.console.set_cursor_position(cursor)?;
        Ok(Outcome::Applied)
    }

    /// `K`: erase in line. Unparsable modes default to 0.
    ///
    /// Mode 2 clears the last row of the maximum window and parks the
    /// cursor at its start, not the cursor's own row.
    fn erase_in_line(&self, command: &ParsedCommand) -> Result<Outcome, ConsoleError> {
        let mode = command.param_i16_lenient(0, 0);
        let snapshot = self.console.snapshot()?;
        let max = snapshot.max_window;
        let cursor = snapshot.cursor;
        let (start, end, cursor) = match mode {
            0 => (cursor, Coord::new(max.x - 1, cursor.y), cursor),
            1 => (Coord::new(0, cursor.y), cursor, cursor),
            2 => {
                let last = max.y - 1;
                (Coord::new(0, last), Coord::new(max.x - 1, last), Coord::new(0, last))
            }
            _ => return Ok(Outcome::Ignored),
        };
        self.clear_range(start, end, max)?;
        self.console.set_cursor_position(cursor)?;
        Ok(Outcome::Applied)
    }

    fn clear_range(&self, start: Coord, end: Coord, size: Coord) -> Result<(), ConsoleError> {
        let cells = count_cells(start, end, size);
        if cells == 0 {
            return Ok(());
        }
        let written = self
            .console
            .fill_output_character(self.config.fill_char, cells, start)?;
        if written < cells {
            crate::debug!(requested = cells, written, "erase fill was clamped");
        }
        Ok(())
    }

    /// `h` / `l`: only the `?25` private mode is honored.
    fn cursor_visibility(
        &self,
        command: &ParsedCommand,
        visible: bool,
    ) -> Result<Outcome, ConsoleError> {
        if command.param(0) != CURSOR_VISIBILITY {
            return Ok(Outcome::Ignored);
        }
        self.console.set_cursor_visible(visible)?;
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_console::{SurfaceCall, SurfaceOp, VirtualConsole};

    fn setup(width: i16, height: i16) -> (Arc<VirtualConsole>, OutputDispatcher<VirtualConsole>) {
        let console = Arc::new(VirtualConsole::new(width, height));
        let dispatcher = OutputDispatcher::new(Arc::clone(&console));
        (console, dispatcher)
    }

    fn fill_console(console: &VirtualConsole) {
        let size = console.size();
        let cells = size.x as u32 * size.y as u32;
        console
            .fill_output_character('x', cells, Coord::new(0, 0))
            .unwrap();
        console.clear_calls();
    }

    #[test]
    fn sgr_bold_white() {
        let (console, d) = setup(80, 25);
        assert_eq!(d.handle(b"1;37m").unwrap(), 5);
        assert_eq!(
            console.attributes(),
            AttributeBits::FOREGROUND_RGB | AttributeBits::FOREGROUND_INTENSITY
        );
    }

    #[test]
    fn sgr_without_parameters_is_reset() {
        let (console, d) = setup(80, 25);
        d.handle(b"\x1b[m").unwrap();
        assert_eq!(console.attributes(), AttributeBits::FOREGROUND_MASK);
    }

    #[test]
    fn sgr_empty_segments_count_as_reset() {
        let (console, d) = setup(80, 25);
        d.handle(b";4m").unwrap();
        assert_eq!(
            console.attributes(),
            AttributeBits::FOREGROUND_MASK | AttributeBits::UNDERSCORE
        );
    }

    #[test]
    fn sgr_unsupported_value_applies_nothing() {
        let (console, d) = setup(80, 25);
        let before = console.attributes();
        let err = d.handle(b"1;38;5;200m").unwrap_err();
        assert_eq!(err.consumed(), 11);
        assert!(matches!(err.error(), ConsoleError::UnsupportedSgr(38)));
        assert_eq!(console.attributes(), before);
        assert!(console.mutations().is_empty());
    }

    #[test]
    fn sgr_non_numeric_value_is_invalid() {
        let (console, d) = setup(80, 25);
        let err = d.handle(b"1;xm").unwrap_err();
        assert!(matches!(
            err.error(),
            ConsoleError::InvalidParameter { command: 'm', index: 1, .. }
        ));
        assert!(console.mutations().is_empty());
    }

    #[test]
    fn cursor_position_is_one_based() {
        let (console, d) = setup(80, 25);
        d.handle(b"10;5H").unwrap();
        assert_eq!(console.cursor(), Coord::new(4, 9));
        d.handle(b"3;7f").unwrap();
        assert_eq!(console.cursor(), Coord::new(6, 2));
    }

    #[test]
    fn cursor_position_defaults_to_home() {
        let (console, d) = setup(80, 25);
        console.place_cursor(Coord::new(10, 10));
        d.handle(b"H").unwrap();
        assert_eq!(console.cursor(), Coord::new(0, 0));

        console.place_cursor(Coord::new(10, 10));
        d.handle(b";5H").unwrap();
        assert_eq!(console.cursor(), Coord::new(4, 0));

    }

    #[test]
    fn cursor_position_zero_is_passed_through() {
        let (console, d) = setup(80, 25);
        console.place_cursor(Coord::new(10, 10));
        let err = d.handle(b"0;0H").unwrap_err();
        assert!(matches!(err.error(), ConsoleError::Io(_)));
        assert_eq!(
            console.calls().last(),
            Some(&SurfaceCall::SetCursorPosition(Coord::new(-1, -1)))
        );
        assert_eq!(console.cursor(), Coord::new(10, 10));

        d.handle(b"1;0H").unwrap_err();
        d.handle(b"1;1H").unwrap();
        assert_eq!(console.cursor(), Coord::new(0, 0));
    }

    #[test]
    fn cursor_position_rejects_garbage() {
        let (console, d) = setup(80, 25);
        let err = d.handle(b"a;2H").unwrap_err();
        assert!(matches!(
            err.error(),
            ConsoleError::InvalidParameter { command: 'H', index: 0, .. }
        ));
        assert_eq!(console.cursor(), Coord::new(0, 0));
    }

    #[test]
    fn relative_moves() {
        let (console, d) = setup(80, 25);
        console.place_cursor(Coord::new(10, 10));
        d.handle(b"A").unwrap();
        assert_eq!(console.cursor(), Coord::new(10, 9));
        d.handle(b"3B").unwrap();
        assert_eq!(console.cursor(), Coord::new(10, 12));
        d.handle(b"5C").unwrap();
        assert_eq!(console.cursor(), Coord::new(15, 12));
        d.handle(b"0D").unwrap();
        assert_eq!(console.cursor(), Coord::new(15, 12));
        d.handle(b"-2D").unwrap();
        assert_eq!(console.cursor(), Coord::new(17, 12));
    }

    #[test]
    fn relative_move_reads_fresh_snapshot() {
        let (console, d) = setup(80, 25);
        d.handle(b"2C").unwrap();
        assert_eq!(
            console.calls(),
            vec![
                SurfaceCall::Snapshot,
                SurfaceCall::SetCursorPosition(Coord::new(2, 0)),
            ]
        );
    }

    #[test]
    fn relative_move_off_screen_fails_and_keeps_cursor() {
        let (console, d) = setup(80, 25);
        console.place_cursor(Coord::new(0, 0));
        let err = d.handle(b"A").unwrap_err();
        assert!(matches!(err.error(), ConsoleError::Io(_)));
        assert_eq!(console.cursor(), Coord::new(0, 0));
    }

    #[test]
    fn erase_display_from_cursor() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(4, 1));
        d.handle(b"J").unwrap();
        assert_eq!(console.screen_text(), "xxxxxxxxxx\nxxxx\n");
        assert_eq!(console.cursor(), Coord::new(4, 1));
    }

    #[test]
    fn erase_display_to_cursor() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(4, 1));
        d.handle(b"1J").unwrap();
        assert_eq!(console.row_text(0), "");
        assert_eq!(console.row_text(1), "     xxxxx");
        assert_eq!(console.row_text(2), "xxxxxxxxxx");
        assert_eq!(console.cursor(), Coord::new(4, 1));
    }

    #[test]
    fn erase_display_whole_screen_homes_cursor() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(4, 1));
        d.handle(b"2J").unwrap();
        assert_eq!(console.screen_text(), "\n\n");
        assert_eq!(console.cursor(), Coord::new(0, 0));
    }

    #[test]
    fn erase_display_unparsable_mode_defaults_to_zero() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(0, 2));
        d.handle(b"zJ").unwrap();
        assert_eq!(console.row_text(2), "");
        assert_eq!(console.row_text(1), "xxxxxxxxxx");
    }

    #[test]
    fn erase_unknown_mode_is_ignored() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        d.handle(b"3J").unwrap();
        d.handle(b"7K").unwrap();
        assert!(console.mutations().is_empty());
        assert_eq!(d.stats().ignored, 2);
    }

    #[test]
    fn erase_line_modes() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(6, 0));
        d.handle(b"K").unwrap();
        assert_eq!(console.row_text(0), "xxxxxx");

        console.place_cursor(Coord::new(2, 1));
        d.handle(b"1K").unwrap();
        assert_eq!(console.row_text(1), "   xxxxxxx");
        assert_eq!(console.cursor(), Coord::new(2, 1));
    }

    #[test]
    fn erase_line_two_clears_last_window_row() {
        let (console, d) = setup(10, 3);
        fill_console(&console);
        console.place_cursor(Coord::new(5, 0));
        d.handle(b"2K").unwrap();
        assert_eq!(console.row_text(0), "xxxxxxxxxx");
        assert_eq!(console.row_text(1), "xxxxxxxxxx");
        assert_eq!(console.row_text(2), "");
        assert_eq!(console.cursor(), Coord::new(0, 2));
    }

    #[test]
    fn erase_uses_maximum_window_bounds() {
        let console = Arc::new(
            VirtualConsole::new(10, 5).with_max_window(Coord::new(8, 4)),
        );
        let d = OutputDispatcher::new(Arc::clone(&console));
        d.handle(b"2J").unwrap();
        assert!(console.calls().contains(&SurfaceCall::FillOutputCharacter {
            ch: ' ',
            len: 32,
            origin: Coord::new(0, 0),
        }));
    }

    #[test]
    fn erase_with_cursor_outside_window_skips_fill() {
        let console = Arc::new(
            VirtualConsole::new(10, 5).with_max_window(Coord::new(8, 4)),
        );
        let d = OutputDispatcher::new(Arc::clone(&console));
        console.place_cursor(Coord::new(9, 4));
        d.handle(b"K").unwrap();
        assert!(
            !console
                .calls()
                .iter()
                .any(|c| matches!(c, SurfaceCall::FillOutputCharacter { .. }))
        );
    }

    #[test]
    fn configured_fill_char() {
        let console = Arc::new(VirtualConsole::new(4, 1));
        let d = OutputDispatcher::with_config(
            Arc::clone(&console),
            ConhostConfig::default().with_fill_char('.'),
        );
        d.handle(b"2J").unwrap();
        assert_eq!(console.row_text(0), "....");
    }

    #[test]
    fn cursor_visibility() {
        let (console, d) = setup(10, 3);
        d.handle(b"?25l").unwrap();
        assert!(!console.cursor_visible());
        d.handle(b"?25h").unwrap();
        assert!(console.cursor_visible());
    }

    #[test]
    fn other_private_modes_are_ignored() {
        let (console, d) = setup(10, 3);
        d.handle(b"?1049h").unwrap();
        d.handle(b"25l").unwrap();
        assert!(console.cursor_visible());
        assert!(console.calls().is_empty());
    }

    #[test]
    fn unknown_commands_are_consumed() {
        let (console, d) = setup(10, 3);
        assert_eq!(d.handle(b"5S").unwrap(), 2);
        assert_eq!(d.handle(b"").unwrap(), 0);
        assert!(console.calls().is_empty());
        assert_eq!(
            d.stats(),
            DispatchStats {
                commands: 2,
                failures: 0,
                ignored: 2
            }
        );
    }

    #[test]
    fn surface_failure_is_reported_not_retried() {
        let (console, d) = setup(10, 3);
        console.fail_next(SurfaceOp::SetTextAttribute, Some(6));
        let err = d.handle(b"\x1b[31m").unwrap_err();
        assert_eq!(err.consumed(), 5);
        let io_err: std::io::Error = err.into_error().into();
        assert_eq!(io_err.raw_os_error(), Some(6));
        let attempts = console
            .calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::SetTextAttribute(_)))
            .count();
        assert_eq!(attempts, 1);
        assert_eq!(d.stats().failures, 1);
    }

    #[test]
    fn snapshot_failure_aborts_erase() {
        let (console, d) = setup(10, 3);
        console.fail_next(SurfaceOp::Snapshot, None);
        let err = d.handle(b"2J").unwrap_err();
        assert!(matches!(err.error(), ConsoleError::Io(e) if e.kind() == std::io::ErrorKind::InvalidInput));
        assert!(console.mutations().is_empty());
    }

    #[test]
    fn works_through_trait_object() {
        let console = Arc::new(VirtualConsole::new(10, 3));
        let surface: Arc<dyn ConsoleSurface> = console.clone();
        let d = OutputDispatcher::new(surface);
        d.handle(b"2;3H").unwrap();
        assert_eq!(console.cursor(), Coord::new(2, 1));
    }
}
