#![forbid(unsafe_code)]

//! `io::Write` / `io::Read` adapters.
//!
//! [`ConsoleWriter`] splits an output byte stream into plain text, which is
//! forwarded to an inner writer, and CSI commands, which are executed by an
//! [`OutputDispatcher`]. [`ConsoleReader`] exposes an [`InputEncoder`] as a
//! byte source.
//!
//! # Scanner states
//!
//! ```text
//! Ground --ESC--> Escape --'['--> Csi --final byte--> Ground (dispatch)
//!                   |
//!                   +--other--> Ground (ESC and byte pass through)
//! ```
//!
//! The state survives across `write` calls, so a sequence split between two
//! writes is reassembled. Text preceding a command is written and the inner
//! writer flushed before the command runs, keeping output and cursor
//! movement in stream order.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::console::ConsoleSurface;
use crate::dispatch::OutputDispatcher;
use crate::error::DispatchError;
use crate::keys::InputEncoder;

const ESC: u8 = 0x1b;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Ground,
    Escape,
    Csi,
}

/// Final bytes of a control sequence (`@` through `~`).
#[inline]
fn is_final_byte(byte: u8) -> bool {
    (0x40..=0x7e).contains(&byte)
}

/// Writer that executes embedded CSI commands against a console.
///
/// Commands longer than the configured cap keep their first
/// `max_command_len - 1` parameter bytes and their final byte. A command
/// that fails does not fail the `write`: the error is logged, counted and
/// kept for [`ConsoleWriter::take_last_error`].
///
/// When the inner writer fails after a command of the same buffer already
/// ran, `write` reports the bytes up to that command as written, so a
/// retry of the rest never runs a command twice.
#[derive(Debug)]
pub struct ConsoleWriter<W: Write, C: ConsoleSurface + ?Sized> {
    inner: W,
    dispatcher: Arc<OutputDispatcher<C>>,
    max_command_len: usize,
    state: ScanState,
    command: Vec<u8>,
    truncated: bool,
    failed: u64,
    last_error: Option<DispatchError>,
}

impl<W: Write, C: ConsoleSurface + ?Sized> ConsoleWriter<W, C> {
    /// Wrap `inner`; the command cap comes from the dispatcher's config.
    pub fn new(inner: W, dispatcher: Arc<OutputDispatcher<C>>) -> Self {
        let max_command_len = dispatcher.config().max_command_len.max(1);
        Self {
            inner,
            dispatcher,
            max_command_len,
            state: ScanState::Ground,
            command: Vec::new(),
            truncated: false,
            failed: 0,
            last_error: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the inner writer. A partially received command is discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<OutputDispatcher<C>> {
        &self.dispatcher
    }

    /// Number of commands that failed since creation.
    #[must_use]
    pub fn failed_commands(&self) -> u64 {
        self.failed
    }

    /// The most recent dispatch failure, if any, clearing it.
    pub fn take_last_error(&mut self) -> Option<DispatchError> {
        self.last_error.take()
    }

    /// Scan one byte. Returns `true` when it completed a dispatched command.
    fn advance(&mut self, byte: u8, text: &mut Vec<u8>) -> io::Result<bool> {
        match self.state {
            ScanState::Ground => {
                if byte == ESC {
                    self.state = ScanState::Escape;
                } else {
                    text.push(byte);
                }
            }
            ScanState::Escape => {
                if byte == b'[' {
                    self.state = ScanState::Csi;
                    self.command.clear();
                    self.truncated = false;
                } else {
                    // Not a CSI: the escape is plain output and the byte is
                    // scanned again from ground.
                    text.push(ESC);
                    self.state = ScanState::Ground;
                    return self.advance(byte, text);
                }
            }
            ScanState::Csi => {
                if is_final_byte(byte) {
                    self.command.push(byte);
                    self.state = ScanState::Ground;
                    self.inner.write_all(text)?;
                    text.clear();
                    self.inner.flush()?;
                    self.dispatch();
                    return Ok(true);
                } else if self.command.len() + 1 < self.max_command_len {
                    self.command.push(byte);
                } else {
                    self.truncated = true;
                }
            }
        }
        Ok(false)
    }

    fn dispatch(&mut self) {
        if self.truncated {
            crate::debug!(
                kept = self.command.len(),
                cap = self.max_command_len,
                "CSI command truncated"
            );
        }
        if let Err(err) = self.dispatcher.handle(&self.command) {
            self.failed += 1;
            crate::debug!(error = %err, "output command failed");
            self.last_error = Some(err);
        }
        self.command.clear();
        self.truncated = false;
    }
}

impl<W: Write, C: ConsoleSurface + ?Sized> Write for ConsoleWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (entry_state, entry_len, entry_truncated) =
            (self.state, self.command.len(), self.truncated);
        let mut text = Vec::with_capacity(buf.len());
        let mut done = 0;
        let mut result = Ok(());
        for (i, &byte) in buf.iter().enumerate() {
            match self.advance(byte, &mut text) {
                Ok(true) => done = i + 1,
                Ok(false) => {}
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        match result.and_then(|()| self.inner.write_all(&text)) {
            Ok(()) => Ok(buf.len()),
            Err(err) if done > 0 => {
                // Everything up to the last command is settled; the rest
                // is scanned again from ground when the caller retries.
                crate::debug!(error = %err, written = done, "inner write failed after dispatch");
                self.state = ScanState::Ground;
                self.command.clear();
                self.truncated = false;
                Ok(done)
            }
            Err(err) => {
                self.state = entry_state;
                self.command.truncate(entry_len);
                self.truncated = entry_truncated;
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader producing terminal bytes from console key events.
///
/// Never blocks: a read with no pending key events returns `Ok(0)`.
#[derive(Debug)]
pub struct ConsoleReader<C: ConsoleSurface + ?Sized> {
    encoder: Arc<InputEncoder<C>>,
}

impl<C: ConsoleSurface + ?Sized> ConsoleReader<C> {
    pub fn new(encoder: Arc<InputEncoder<C>>) -> Self {
        Self { encoder }
    }

    #[must_use]
    pub fn encoder(&self) -> &Arc<InputEncoder<C>> {
        &self.encoder
    }
}

impl<C: ConsoleSurface + ?Sized> Read for ConsoleReader<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.encoder.read_keys(buf)
    }
}
