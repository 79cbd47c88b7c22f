#![forbid(unsafe_code)]

//! Translator tunables.
//!
//! Values are deterministic given the environment: [`ConhostConfig::from_env`]
//! reads the process environment, [`ConhostConfig::from_env_with`] takes a
//! lookup closure so tests can inject values.

/// Environment variable overriding the CSI command length cap.
const ENV_MAX_CMD_LEN: &str = "FTUI_CONHOST_MAX_CMD_LEN";
/// Environment variable overriding the character used by erase commands.
const ENV_FILL_CHAR: &str = "FTUI_CONHOST_FILL_CHAR";

/// Default cap on the bytes of one CSI command (introducer excluded).
pub const DEFAULT_MAX_COMMAND_LEN: usize = 256;

/// Smallest accepted command cap; a final byte always fits.
const MIN_MAX_COMMAND_LEN: usize = 1;

/// Configuration shared by the stream adapters and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConhostConfig {
    /// Maximum bytes collected for one CSI command before excess parameter
    /// bytes are dropped.
    pub max_command_len: usize,
    /// Character written by `J` / `K` erase commands.
    pub fill_char: char,
}

impl Default for ConhostConfig {
    fn default() -> Self {
        Self {
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
            fill_char: ' ',
        }
    }
}

impl ConhostConfig {
    /// Set the command length cap (clamped to at least 1).
    #[must_use]
    pub fn with_max_command_len(mut self, len: usize) -> Self {
        self.max_command_len = len.max(MIN_MAX_COMMAND_LEN);
        self
    }

    /// Set the erase fill character.
    #[must_use]
    pub fn with_fill_char(mut self, ch: char) -> Self {
        self.fill_char = ch;
        self
    }

    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read overrides through a custom lookup (for tests).
    ///
    /// Unparsable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(len) = get_env(ENV_MAX_CMD_LEN).and_then(|v| v.trim().parse::<usize>().ok()) {
            config = config.with_max_command_len(len);
        }
        if let Some(ch) = get_env(ENV_FILL_CHAR).and_then(|v| single_char(&v)) {
            config.fill_char = ch;
        }
        config
    }
}

fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    let ch = chars.next()?;
    chars.next().is_none().then_some(ch)
}
