#![forbid(unsafe_code)]

//! Crossterm key events as native key records.
//!
//! Lets key events captured with Crossterm on any platform be fed through
//! [`encode_key`](crate::keys::encode_key) or queued on a
//! [`VirtualConsole`](crate::virtual_console::VirtualConsole).

use crossterm::event as cte;

use crate::console::{ControlKeyState, KeyRecord, VirtualKey};

impl KeyRecord {
    /// Convert a Crossterm key event.
    ///
    /// Returns `None` for keys with no native counterpart and for characters
    /// outside the Basic Multilingual Plane.
    #[must_use]
    pub fn from_crossterm(event: cte::KeyEvent) -> Option<Self> {
        let record = map_key_code(event.code)?.with_state(map_modifiers(event.modifiers));
        Some(match event.kind {
            cte::KeyEventKind::Press | cte::KeyEventKind::Repeat => record,
            cte::KeyEventKind::Release => record.released(),
        })
    }
}

fn map_key_code(code: cte::KeyCode) -> Option<KeyRecord> {
    let virtual_key = match code {
        cte::KeyCode::Char(c) => return char_record(c),
        cte::KeyCode::Enter => return char_record('\r'),
        cte::KeyCode::Tab => return char_record('\t'),
        cte::KeyCode::Backspace => return char_record('\u{8}'),
        cte::KeyCode::Esc => return char_record('\u{1b}'),
        cte::KeyCode::Up => VirtualKey::UP,
        cte::KeyCode::Down => VirtualKey::DOWN,
        cte::KeyCode::Left => VirtualKey::LEFT,
        cte::KeyCode::Right => VirtualKey::RIGHT,
        cte::KeyCode::Home => VirtualKey::HOME,
        cte::KeyCode::End => VirtualKey::END,
        cte::KeyCode::PageUp => VirtualKey::PRIOR,
        cte::KeyCode::PageDown => VirtualKey::NEXT,
        cte::KeyCode::Insert => VirtualKey::INSERT,
        cte::KeyCode::Delete => VirtualKey::DELETE,
        cte::KeyCode::F(n) => VirtualKey::function(n)?,
        _ => return None,
    };
    Some(KeyRecord::key(virtual_key))
}

fn char_record(c: char) -> Option<KeyRecord> {
    let record = KeyRecord::char(c);
    (record.unicode_char != 0).then_some(record)
}

fn map_modifiers(modifiers: cte::KeyModifiers) -> ControlKeyState {
    let mut state = ControlKeyState::empty();
    if modifiers.contains(cte::KeyModifiers::SHIFT) {
        state |= ControlKeyState::SHIFT_PRESSED;
    }
    if modifiers.contains(cte::KeyModifiers::ALT) {
        state |= ControlKeyState::LEFT_ALT_PRESSED;
    }
    if modifiers.contains(cte::KeyModifiers::CONTROL) {
        state |= ControlKeyState::LEFT_CTRL_PRESSED;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::encode_key;

    fn event(code: cte::KeyCode, modifiers: cte::KeyModifiers) -> cte::KeyEvent {
        cte::KeyEvent {
            code,
            modifiers,
            kind: cte::KeyEventKind::Press,
            state: cte::KeyEventState::NONE,
        }
    }

    #[test]
    fn arrows_map_to_virtual_keys() {
        let record =
            KeyRecord::from_crossterm(event(cte::KeyCode::Up, cte::KeyModifiers::NONE)).unwrap();
        assert_eq!(record.virtual_key, VirtualKey::UP);
        assert_eq!(encode_key(&record), b"\x1b[A");
    }

    #[test]
    fn modifiers_map_to_control_state() {
        let record =
            KeyRecord::from_crossterm(event(cte::KeyCode::Up, cte::KeyModifiers::CONTROL))
                .unwrap();
        assert_eq!(record.control_state, ControlKeyState::LEFT_CTRL_PRESSED);
        assert_eq!(encode_key(&record), b"\x1b[;5A");
    }

    #[test]
    fn alt_char_encodes_esc_n() {
        let record =
            KeyRecord::from_crossterm(event(cte::KeyCode::Char('Q'), cte::KeyModifiers::ALT))
                .unwrap();
        assert_eq!(encode_key(&record), b"\x1bNq");
    }

    #[test]
    fn function_keys_and_unmapped() {
        let f7 = KeyRecord::from_crossterm(event(cte::KeyCode::F(7), cte::KeyModifiers::NONE))
            .unwrap();
        assert_eq!(f7.virtual_key, VirtualKey::F7);
        assert!(
            KeyRecord::from_crossterm(event(cte::KeyCode::F(30), cte::KeyModifiers::NONE))
                .is_none()
        );
        assert!(
            KeyRecord::from_crossterm(event(cte::KeyCode::CapsLock, cte::KeyModifiers::NONE))
                .is_none()
        );
    }

    #[test]
    fn release_becomes_key_up() {
        let mut ev = event(cte::KeyCode::Char('a'), cte::KeyModifiers::NONE);
        ev.kind = cte::KeyEventKind::Release;
        let record = KeyRecord::from_crossterm(ev).unwrap();
        assert!(!record.key_down);
        assert!(encode_key(&record).is_empty());
    }

    #[test]
    fn astral_chars_are_rejected() {
        assert!(
            KeyRecord::from_crossterm(event(cte::KeyCode::Char('🎉'), cte::KeyModifiers::NONE))
                .is_none()
        );
    }
}
