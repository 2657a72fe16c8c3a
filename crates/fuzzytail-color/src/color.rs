use std::fmt::{self, Write};
use std::str::FromStr;

use crate::error::InvalidColor;

/// Full SGR reset
pub const RESET: &str = "\x1b[0m";

/// Foreground color used by rules and the base tint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Xterm256(u8),
    TrueColor { r: u8, g: u8, b: u8 },
}

impl Color {
    /// Escape sequence that switches the foreground to this color
    pub fn fg_escape(&self) -> String {
        let mut out = String::with_capacity(19);
        self.write_fg(&mut out);
        out
    }

    /// Append the foreground escape to `out`
    pub fn write_fg(&self, out: &mut String) {
        // Writing to a String cannot fail
        let _ = match self {
            Self::Xterm256(n) => write!(out, "\x1b[38;5;{}m", n),
            Self::TrueColor { r, g, b } => write!(out, "\x1b[38;2;{};{};{}m", r, g, b),
        };
    }
}

impl FromStr for Color {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidColor(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            return Ok(Self::TrueColor {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
            });
        }

        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<u8>().map(Self::Xterm256).map_err(|_| invalid())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xterm256(n) => write!(f, "{}", n),
            Self::TrueColor { r, g, b } => write!(f, "#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}
