#![forbid(unsafe_code)]

//! Native attribute bits and the SGR attribute translator.
//!
//! The native console encodes the current text style in one 16-bit field:
//!
//! ```text
//!  15   14  ...   7   6   5   4   3   2   1   0
//! [US] [RV] ... [BI][BR][BG][BB][FI][FR][FG][FB]
//! ```
//!
//! `F*` is the foreground nibble, `B*` the background nibble, `US` the
//! underscore flag and `RV` reverse video. The native surface has no blink,
//! so blink is rendered as background intensity.
//!
//! Every mutation goes through a masked read-modify-write helper on
//! [`AttributeBits`], so one SGR step never disturbs bits it does not own.

use bitflags::bitflags;

use crate::error::ConsoleError;

bitflags! {
    /// Native text attribute field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributeBits: u16 {
        const FOREGROUND_BLUE      = 0x0001;
        const FOREGROUND_GREEN     = 0x0002;
        const FOREGROUND_RED       = 0x0004;
        const FOREGROUND_INTENSITY = 0x0008;
        const BACKGROUND_BLUE      = 0x0010;
        const BACKGROUND_GREEN     = 0x0020;
        const BACKGROUND_RED       = 0x0040;
        const BACKGROUND_INTENSITY = 0x0080;
        const REVERSE_VIDEO        = 0x4000;
        const UNDERSCORE           = 0x8000;

        /// Foreground color bits without intensity.
        const FOREGROUND_RGB = Self::FOREGROUND_RED.bits()
            | Self::FOREGROUND_GREEN.bits()
            | Self::FOREGROUND_BLUE.bits();
        /// Whole foreground nibble.
        const FOREGROUND_MASK = Self::FOREGROUND_RGB.bits() | Self::FOREGROUND_INTENSITY.bits();
        /// Background color bits without intensity.
        const BACKGROUND_RGB = Self::BACKGROUND_RED.bits()
            | Self::BACKGROUND_GREEN.bits()
            | Self::BACKGROUND_BLUE.bits();
        /// Whole background nibble.
        const BACKGROUND_MASK = Self::BACKGROUND_RGB.bits() | Self::BACKGROUND_INTENSITY.bits();
    }
}

/// Shift between the foreground and background nibbles.
const NIBBLE_SHIFT: u16 = 4;

/// One of the eight base ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl BaseColor {
    /// Color for an ANSI palette index (`0..=7`).
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Self::Black,
            1 => Self::Red,
            2 => Self::Green,
            3 => Self::Yellow,
            4 => Self::Blue,
            5 => Self::Magenta,
            6 => Self::Cyan,
            7 => Self::White,
            _ => return None,
        })
    }

    /// Native R/G/B bits for this color, in foreground position.
    #[must_use]
    pub const fn rgb_bits(self) -> u16 {
        const R: u16 = AttributeBits::FOREGROUND_RED.bits();
        const G: u16 = AttributeBits::FOREGROUND_GREEN.bits();
        const B: u16 = AttributeBits::FOREGROUND_BLUE.bits();
        match self {
            Self::Black => 0,
            Self::Red => R,
            Self::Green => G,
            Self::Yellow => R | G,
            Self::Blue => B,
            Self::Magenta => R | B,
            Self::Cyan => G | B,
            Self::White => R | G | B,
        }
    }
}

impl AttributeBits {
    /// Foreground nibble (color + intensity), in the low four bits.
    #[must_use]
    pub const fn foreground(self) -> u16 {
        self.bits() & Self::FOREGROUND_MASK.bits()
    }

    /// Background nibble (color + intensity), shifted down to the low four bits.
    #[must_use]
    pub const fn background(self) -> u16 {
        (self.bits() & Self::BACKGROUND_MASK.bits()) >> NIBBLE_SHIFT
    }

    /// Replace the foreground R/G/B bits, keeping foreground intensity.
    #[must_use]
    pub fn with_foreground(self, color: BaseColor) -> Self {
        self.masked(Self::FOREGROUND_RGB, color.rgb_bits())
    }

    /// Replace the background R/G/B bits, keeping background intensity.
    #[must_use]
    pub fn with_background(self, color: BaseColor) -> Self {
        self.masked(Self::BACKGROUND_RGB, color.rgb_bits() << NIBBLE_SHIFT)
    }

    /// Clear the whole background nibble, intensity included.
    #[must_use]
    pub fn clear_background(self) -> Self {
        self.masked(Self::BACKGROUND_MASK, 0)
    }

    /// Set or clear foreground intensity (bold / dim).
    #[must_use]
    pub fn with_intensity(mut self, on: bool) -> Self {
        self.set(Self::FOREGROUND_INTENSITY, on);
        self
    }

    /// Set or clear background intensity (the native stand-in for blink).
    #[must_use]
    pub fn with_blink(mut self, on: bool) -> Self {
        self.set(Self::BACKGROUND_INTENSITY, on);
        self
    }

    /// Set or clear the underscore flag.
    #[must_use]
    pub fn with_underline(mut self, on: bool) -> Self {
        self.set(Self::UNDERSCORE, on);
        self
    }

    /// Swap the foreground and background nibbles in place.
    ///
    /// Applying it twice restores the original field.
    #[must_use]
    pub fn swap_colors(self) -> Self {
        let fg = self.bits() & Self::FOREGROUND_MASK.bits();
        let bg = self.bits() & Self::BACKGROUND_MASK.bits();
        let rest = self.bits() & !(Self::FOREGROUND_MASK.bits() | Self::BACKGROUND_MASK.bits());
        Self::from_bits_retain(rest | (fg << NIBBLE_SHIFT) | (bg >> NIBBLE_SHIFT))
    }

    fn masked(self, mask: Self, value: u16) -> Self {
        Self::from_bits_retain((self.bits() & !mask.bits()) | (value & mask.bits()))
    }
}

/// Apply one SGR value to an attribute field.
///
/// A field of exactly `0` is indistinguishable from "never set" on the
/// native surface, so it is widened to a full foreground nibble first.
///
/// # Errors
///
/// Returns [`ConsoleError::UnsupportedSgr`] for values outside the table.
pub fn translate(current: AttributeBits, sgr: i64) -> Result<AttributeBits, ConsoleError> {
    let bits = if current.is_empty() {
        AttributeBits::FOREGROUND_MASK
    } else {
        current
    };

    let next = match sgr {
        // Reset turns intensity on rather than off; that is what "normal"
        // text looks like on the native console.
        0 => bits
            .with_underline(false)
            .with_blink(false)
            .with_intensity(true),
        1 => bits.with_intensity(true),
        2 => bits.with_intensity(false),
        4 => bits.with_underline(true),
        24 => bits.with_underline(false),
        5 => bits.with_blink(true),
        25 => bits.with_blink(false),
        7 | 27 => bits.swap_colors(),
        30..=37 => bits.with_foreground(palette(sgr - 30)),
        39 => bits.with_foreground(BaseColor::White),
        40..=47 => bits.with_background(palette(sgr - 40)),
        49 => bits.clear_background(),
        other => return Err(ConsoleError::UnsupportedSgr(other)),
    };
    Ok(next)
}

fn palette(offset: i64) -> BaseColor {
    u8::try_from(offset)
        .ok()
        .and_then(BaseColor::from_index)
        .unwrap_or(BaseColor::White)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FG_WHITE: AttributeBits = AttributeBits::FOREGROUND_RGB;

    fn bits(raw: u16) -> AttributeBits {
        AttributeBits::from_bits_retain(raw)
    }

    #[test]
    fn zero_field_is_widened_before_rules() {
        assert_eq!(translate(AttributeBits::empty(), 24).unwrap(), AttributeBits::FOREGROUND_MASK);
        assert_eq!(translate(AttributeBits::empty(), 2).unwrap(), FG_WHITE);
    }

    #[test]
    fn reset_sets_intensity_and_clears_styles() {
        let start = FG_WHITE | AttributeBits::UNDERSCORE | AttributeBits::BACKGROUND_INTENSITY;
        let out = translate(start, 0).unwrap();
        assert_eq!(out, FG_WHITE | AttributeBits::FOREGROUND_INTENSITY);
    }

    #[test]
    fn bold_and_dim_toggle_foreground_intensity() {
        let bold = translate(FG_WHITE, 1).unwrap();
        assert!(bold.contains(AttributeBits::FOREGROUND_INTENSITY));
        let dim = translate(bold, 2).unwrap();
        assert_eq!(dim, FG_WHITE);
    }

    #[test]
    fn underline_and_blink_flags() {
        let u = translate(FG_WHITE, 4).unwrap();
        assert!(u.contains(AttributeBits::UNDERSCORE));
        assert_eq!(translate(u, 24).unwrap(), FG_WHITE);

        let b = translate(FG_WHITE, 5).unwrap();
        assert!(b.contains(AttributeBits::BACKGROUND_INTENSITY));
        assert_eq!(translate(b, 25).unwrap(), FG_WHITE);
    }

    #[test]
    fn foreground_palette_matches_ansi_order() {
        let expected = [0x0, 0x4, 0x2, 0x6, 0x1, 0x5, 0x3, 0x7];
        for (i, want) in expected.into_iter().enumerate() {
            let out = translate(bits(0x0008), 30 + i as i64).unwrap();
            assert_eq!(out.bits(), 0x0008 | want, "SGR {}", 30 + i);
        }
    }

    #[test]
    fn background_palette_keeps_foreground() {
        let out = translate(bits(0x000C), 44).unwrap();
        assert_eq!(out.bits(), 0x001C);
        let out = translate(out, 41).unwrap();
        assert_eq!(out.bits(), 0x004C);
        let out = translate(out, 49).unwrap();
        assert_eq!(out.bits(), 0x000C);
    }

    #[test]
    fn default_background_clears_intensity_too() {
        assert_eq!(translate(bits(0x00F7), 49).unwrap().bits(), 0x0007);
        let blinking = translate(bits(0x8047), 5).unwrap();
        assert_eq!(translate(blinking, 49).unwrap().bits(), 0x8007);
    }

    #[test]
    fn default_foreground_is_white_not_stored_default() {
        let red = translate(bits(0x0014), 31).unwrap();
        assert_eq!(red.bits(), 0x0014);
        assert_eq!(translate(red, 39).unwrap().bits(), 0x0017);
    }

    #[test]
    fn reverse_swaps_nibbles_and_keeps_high_flags() {
        let start = bits(0x801E);
        let rev = translate(start, 7).unwrap();
        assert_eq!(rev.bits(), 0x80E1);
        assert_eq!(translate(rev, 27).unwrap(), start);
    }

    #[test]
    fn reverse_on_twice_returns_to_original() {
        let start = bits(0x0047);
        let once = translate(start, 7).unwrap();
        assert_eq!(translate(once, 7).unwrap(), start);
    }

    #[test]
    fn unknown_values_are_rejected() {
        for value in [3, 8, 22, 38, 48, 90, 107, -1] {
            assert!(
                matches!(translate(FG_WHITE, value), Err(ConsoleError::UnsupportedSgr(v)) if v == value),
                "SGR {value} should be unsupported"
            );
        }
    }

    #[test]
    fn nibble_accessors() {
        let field = bits(0x00A5);
        assert_eq!(field.foreground(), 0x5);
        assert_eq!(field.background(), 0xA);
    }
}
