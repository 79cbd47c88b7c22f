#![forbid(unsafe_code)]

//! Native key records to terminal byte sequences.
//!
//! [`encode_key`] is the pure per-record encoder. [`InputEncoder`] polls a
//! [`ConsoleSurface`] for pending records and packs the encodings of every
//! key-down event into a caller buffer.
//!
//! Navigation and function keys use the xterm modifier parameter
//! (`1 + bits`, bits = shift 1, alt 2, control 4), placed directly before
//! the final byte: Ctrl+Up is `ESC [ ;5 A`, Shift+F5 is `ESC [ 15;2 ~`.

use std::io;
use std::sync::{Arc, Mutex};

use crate::console::{ConsoleSurface, InputRecord, KeyRecord, Modifiers, VirtualKey};
use crate::lock_unpoisoned;

/// Shape of the sequence sent for a non-character key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyTemplate {
    /// `ESC [ <mod> final`
    Cursor(u8),
    /// `ESC [ prefix <mod> ~`
    Tilde(&'static str),
}

fn template(key: VirtualKey) -> Option<KeyTemplate> {
    use KeyTemplate::{Cursor, Tilde};

    Some(match key {
        VirtualKey::UP => Cursor(b'A'),
        VirtualKey::DOWN => Cursor(b'B'),
        VirtualKey::RIGHT => Cursor(b'C'),
        VirtualKey::LEFT => Cursor(b'D'),
        VirtualKey::HOME => Tilde("H"),
        VirtualKey::END => Tilde("F"),
        VirtualKey::INSERT => Tilde("2"),
        VirtualKey::DELETE => Tilde("3"),
        VirtualKey::F3 => Tilde("13"),
        VirtualKey::F4 => Tilde("14"),
        VirtualKey::F5 => Tilde("15"),
        VirtualKey::F6 => Tilde("17"),
        VirtualKey::F7 => Tilde("18"),
        VirtualKey::F8 => Tilde("19"),
        VirtualKey::F9 => Tilde("20"),
        VirtualKey::F10 => Tilde("21"),
        VirtualKey::F11 => Tilde("23"),
        VirtualKey::F12 => Tilde("24"),
        // F1, F2 and everything else produce nothing.
        _ => return None,
    })
}

/// `;<1 + bits>` for a non-empty modifier set, empty otherwise.
fn modifier_param(mods: Modifiers) -> String {
    if mods.is_empty() {
        String::new()
    } else {
        format!(";{}", 1 + mods.bits())
    }
}

/// Encode one key record.
///
/// Key-up records, unmapped virtual keys and lone surrogate code units
/// encode to nothing. A character typed with Alt but without Control is
/// sent as `ESC N` followed by the lowercased character; every other
/// character is sent verbatim as UTF-8, control characters included.
#[must_use]
pub fn encode_key(key: &KeyRecord) -> Vec<u8> {
    if !key.key_down {
        return Vec::new();
    }
    let mods = key.modifiers();

    if key.unicode_char == 0 {
        let Some(template) = template(key.virtual_key) else {
            return Vec::new();
        };
        let param = modifier_param(mods);
        return match template {
            KeyTemplate::Cursor(final_byte) => {
                format!("\x1b[{param}{}", char::from(final_byte)).into_bytes()
            }
            KeyTemplate::Tilde(prefix) => format!("\x1b[{prefix}{param}~").into_bytes(),
        };
    }

    let Some(ch) = char::from_u32(u32::from(key.unicode_char)) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(8);
    if mods.contains(Modifiers::ALT) && !mods.contains(Modifiers::CTRL) {
        out.extend_from_slice(b"\x1bN");
        for lower in ch.to_lowercase() {
            let mut buf = [0u8; 4];
            out.extend_from_slice(lower.encode_utf8(&mut buf).as_bytes());
        }
        return out;
    }

    let mut buf = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    out
}

/// Counters kept by the input encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    /// Input records removed from the console.
    pub records_read: u64,
    /// Key sequences written to caller buffers.
    pub keys_encoded: u64,
    /// Non-empty key sequences discarded because the buffer was full.
    pub keys_dropped: u64,
}

/// Polls a console for key events and encodes them.
#[derive(Debug)]
pub struct InputEncoder<C: ConsoleSurface + ?Sized> {
    console: Arc<C>,
    stats: Mutex<InputStats>,
}

impl<C: ConsoleSurface + ?Sized> InputEncoder<C> {
    pub fn new(console: Arc<C>) -> Self {
        Self {
            console,
            stats: Mutex::new(InputStats::default()),
        }
    }

    /// The console this encoder reads from.
    #[must_use]
    pub fn console(&self) -> &Arc<C> {
        &self.console
    }

    #[must_use]
    pub fn stats(&self) -> InputStats {
        *lock_unpoisoned(&self.stats)
    }

    /// Drain pending input records into `buf` as terminal bytes.
    ///
    /// Never blocks: with nothing pending this returns `Ok(0)` without
    /// reading. All pending records are consumed. Encodings are copied whole
    /// and in order; the first one that does not fit in the remaining space
    /// ends the batch and the rest of it is discarded.
    ///
    /// # Errors
    ///
    /// Propagates failures of the pending-count query or the read.
    pub fn read_keys(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stats = lock_unpoisoned(&self.stats);
        if buf.is_empty() {
            return Ok(0);
        }

        let pending = self.console.pending_input_events()?;
        if pending == 0 {
            return Ok(0);
        }
        let records = self.console.read_input(pending)?;
        stats.records_read += records.len() as u64;

        let mut written = 0;
        for (i, record) in records.iter().enumerate() {
            let InputRecord::Key(key) = record else {
                continue;
            };
            let seq = encode_key(key);
            if seq.is_empty() {
                continue;
            }
            if seq.len() > buf.len() - written {
                let dropped = 1 + records[i + 1..]
                    .iter()
                    .filter(|r| matches!(r, InputRecord::Key(k) if !encode_key(k).is_empty()))
                    .count();
                stats.keys_dropped += dropped as u64;
                crate::debug!(dropped, capacity = buf.len(), "key buffer full");
                break;
            }
            buf[written..written + seq.len()].copy_from_slice(&seq);
            written += seq.len();
            stats.keys_encoded += 1;
        }
        Ok(written)
    }
}
