//! Configuration for the access logger and its base line logger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask controlling the auxiliary output the base [`LineLogger`](crate::LineLogger)
/// writes in front of every line.
///
/// These flags only decorate the line; the access-log fields themselves are
/// unaffected by them.
///
/// # Examples
///
/// ```rust
/// use combined_log::Flags;
///
/// let flags = Flags::DATE | Flags::TIME | Flags::UTC;
/// assert!(flags.contains(Flags::TIME));
/// assert!(!flags.contains(Flags::MICROSECONDS));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// No decoration.
    pub const NONE: Flags = Flags(0);
    /// The date in the local time zone: `2009/01/23`
    pub const DATE: Flags = Flags(1 << 0);
    /// The time in the local time zone: `01:23:23`
    pub const TIME: Flags = Flags(1 << 1);
    /// Microsecond resolution: `01:23:23.123123`. Implies [`Flags::TIME`].
    pub const MICROSECONDS: Flags = Flags(1 << 2);
    /// Full file path and line number of the caller.
    pub const LONG_FILE: Flags = Flags(1 << 3);
    /// Final file name element and line number. Overrides [`Flags::LONG_FILE`].
    pub const SHORT_FILE: Flags = Flags(1 << 4);
    /// Use UTC rather than the local time zone for date and time.
    pub const UTC: Flags = Flags(1 << 5);
    /// Move the prefix from the beginning of the line to before the message.
    pub const MSG_PREFIX: Flags = Flags(1 << 6);
    /// Initial values for a standard logger.
    pub const STD_FLAGS: Flags = Flags(Self::DATE.0 | Self::TIME.0);

    /// Build flags from raw bits. Unknown bits are kept and ignored.
    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 7] = [
            (Flags::DATE, "DATE"),
            (Flags::TIME, "TIME"),
            (Flags::MICROSECONDS, "MICROSECONDS"),
            (Flags::LONG_FILE, "LONG_FILE"),
            (Flags::SHORT_FILE, "SHORT_FILE"),
            (Flags::UTC, "UTC"),
            (Flags::MSG_PREFIX, "MSG_PREFIX"),
        ];

        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Configuration for the access logger.
///
/// The output sink is not part of the configuration; it is handed to
/// [`AccessLogger::new`](crate::AccessLogger::new) alongside it.
///
/// # Examples
///
/// ```rust
/// use combined_log::{AccessLogConfig, Flags};
///
/// // Default configuration: bare access lines, no prefix
/// let config = AccessLogConfig::default();
/// assert!(config.flags.is_empty());
///
/// // Custom configuration
/// let config = AccessLogConfig {
///     prefix: "[access] ".to_string(),
///     flags: Flags::STD_FLAGS,
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Static string written by the base logger in front of every line
    pub prefix: String,
    /// Auxiliary output of the base logger
    pub flags: Flags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_composition() {
        let mut flags = Flags::DATE;
        flags |= Flags::UTC;
        assert!(flags.contains(Flags::DATE | Flags::UTC));
        assert!(!flags.contains(Flags::TIME));
        assert_eq!(Flags::STD_FLAGS, Flags::DATE | Flags::TIME);
        assert_eq!((Flags::STD_FLAGS & Flags::TIME), Flags::TIME);
    }

    #[test]
    fn test_flags_display() {
        assert_eq!(Flags::NONE.to_string(), "NONE");
        assert_eq!((Flags::TIME | Flags::DATE).to_string(), "DATE | TIME");
    }

    #[test]
    fn test_config_deserialize() {
        let config: AccessLogConfig =
            serde_json::from_str(r#"{"prefix": "web: ", "flags": 35}"#).unwrap();
        assert_eq!(config.prefix, "web: ");
        assert_eq!(config.flags, Flags::DATE | Flags::TIME | Flags::UTC);

        let config: AccessLogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AccessLogConfig::default());
    }
}
