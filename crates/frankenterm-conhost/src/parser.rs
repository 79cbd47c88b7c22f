#![forbid(unsafe_code)]

//! CSI command tokenizer.
//!
//! Splits the bytes of one CSI command (`ESC [ params final`) into the final
//! byte and its `;`-separated parameters. Parameters stay strings: some
//! commands compare against sentinels such as `"?25"`, and numeric parsing
//! with a per-command default happens at the call site through
//! [`ParsedCommand::param_i16_or`] and [`ParsedCommand::param_i16_lenient`].

use crate::error::ConsoleError;

/// Control Sequence Introducer.
pub const CSI: &[u8] = b"\x1b[";

/// One parsed CSI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Final byte identifying the command (`'m'`, `'H'`, `'J'`, ...).
    pub command: char,
    /// Parameters in left-to-right order.
    pub parameters: Vec<String>,
}

impl ParsedCommand {
    /// The `index`-th parameter, or `""` when absent.
    #[must_use]
    pub fn param(&self, index: usize) -> &str {
        self.parameters.get(index).map_or("", String::as_str)
    }

    /// Parse the `index`-th parameter as `i16`.
    ///
    /// Absent or empty parameters yield `default`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidParameter`] when the parameter is
    /// present but is not a base-10 `i16`.
    pub fn param_i16_or(&self, index: usize, default: i16) -> Result<i16, ConsoleError> {
        let raw = self.param(index);
        if raw.is_empty() {
            return Ok(default);
        }
        raw.parse::<i16>()
            .map_err(|_| ConsoleError::InvalidParameter {
                command: self.command,
                index,
                value: raw.to_string(),
            })
    }

    /// Parse the `index`-th parameter as `i16`, falling back to `default`
    /// when it is absent, empty or unparsable.
    #[must_use]
    pub fn param_i16_lenient(&self, index: usize, default: i16) -> i16 {
        self.param_i16_or(index, default).unwrap_or(default)
    }
}

/// Parse one CSI command.
///
/// Accepts the command with or without its leading `ESC [`. The last byte is
/// the command; everything between the introducer and the final byte is
/// split on `;`. An empty parameter section yields no parameters, while
/// empty segments inside a list are kept as `""`.
///
/// Returns `None` for empty input.
#[must_use]
pub fn parse_command(bytes: &[u8]) -> Option<ParsedCommand> {
    let body = bytes.strip_prefix(CSI).unwrap_or(bytes);
    let (&final_byte, params) = body.split_last()?;

    let parameters = if params.is_empty() {
        Vec::new()
    } else {
        params
            .split(|&b| b == b';')
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect()
    };

    Some(ParsedCommand {
        command: char::from(final_byte),
        parameters,
    })
}
