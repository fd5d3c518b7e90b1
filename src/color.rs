//! ANSI color schemes.
//!
//! A [`ColorScheme`] maps each token role to an SGR sequence. Colored
//! encoders snapshot the scheme when a logger is built and wrap every token
//! as `<sgr>text\x1b[0m`; an empty sequence leaves the token unwrapped.
//!
//! The process-wide default is only read through [`default_scheme`] and
//! swapped through [`set_default_scheme`], so changing it never races with
//! loggers that are rendering.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::level::Level;

/// Resets all attributes.
pub const RESET: &str = "\x1b[0m";

/// What a rendered token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Timestamp,
    Level(Level),
    Message,
    Key,
    Str,
    Number,
    Bool,
    Null,
    Error,
    Duration,
    Time,
    Json,
}

impl Role {
    /// Number of distinct roles, levels counted individually.
    pub const COUNT: usize = 20;

    /// Dense index into a per-role table.
    pub const fn index(self) -> usize {
        match self {
            Role::Timestamp => 0,
            Role::Message => 1,
            Role::Key => 2,
            Role::Str => 3,
            Role::Number => 4,
            Role::Bool => 5,
            Role::Null => 6,
            Role::Error => 7,
            Role::Duration => 8,
            Role::Time => 9,
            Role::Json => 10,
            Role::Level(level) => 11 + level as usize,
        }
    }

    /// Every role, in index order.
    pub fn all() -> impl Iterator<Item = Role> {
        [
            Role::Timestamp,
            Role::Message,
            Role::Key,
            Role::Str,
            Role::Number,
            Role::Bool,
            Role::Null,
            Role::Error,
            Role::Duration,
            Role::Time,
            Role::Json,
        ]
        .into_iter()
        .chain(Level::ALL.into_iter().map(Role::Level))
        .chain(std::iter::once(Role::Level(Level::Disabled)))
    }
}

/// Source of SGR sequences for each role.
pub trait ColorScheme: Send + Sync {
    /// The SGR sequence that opens a token of `role`. Empty means uncolored.
    fn sgr(&self, role: Role) -> &str;
}

/// A static table of SGR sequences.
#[derive(Debug, Clone)]
pub struct Palette {
    codes: [&'static str; Role::COUNT],
}

impl Palette {
    /// Builds a palette from a lookup function.
    pub fn from_fn(mut f: impl FnMut(Role) -> &'static str) -> Self {
        let mut codes = [""; Role::COUNT];
        for role in Role::all() {
            codes[role.index()] = f(role);
        }
        Self { codes }
    }

    /// Level labels only, bold; everything else uncolored.
    pub fn monochrome() -> Self {
        Self::from_fn(|role| match role {
            Role::Level(_) => "\x1b[1m",
            _ => "",
        })
    }

    pub fn set(&mut self, role: Role, sgr: &'static str) {
        self.codes[role.index()] = sgr;
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_fn(|role| match role {
            Role::Timestamp => "\x1b[90m",
            Role::Message => "\x1b[1m",
            Role::Key => "\x1b[36m",
            Role::Str => "",
            Role::Number => "\x1b[35m",
            Role::Bool => "\x1b[33m",
            Role::Null => "\x1b[90m",
            Role::Error => "\x1b[31m",
            Role::Duration => "\x1b[34m",
            Role::Time => "\x1b[34m",
            Role::Json => "\x1b[32m",
            Role::Level(Level::Trace) => "\x1b[90m",
            Role::Level(Level::Debug) => "\x1b[36m",
            Role::Level(Level::Info) => "\x1b[32m",
            Role::Level(Level::Warn) => "\x1b[33m",
            Role::Level(Level::Error) => "\x1b[31m",
            Role::Level(Level::Fatal) => "\x1b[1;31m",
            Role::Level(Level::Panic) => "\x1b[1;35m",
            Role::Level(Level::NoLevel) | Role::Level(Level::Disabled) => "",
        })
    }
}

impl ColorScheme for Palette {
    fn sgr(&self, role: Role) -> &str {
        self.codes[role.index()]
    }
}

lazy_static! {
    static ref DEFAULT_SCHEME: RwLock<Arc<dyn ColorScheme>> = RwLock::new(Arc::new(Palette::default()));
}

/// The scheme new colored loggers use when none is given.
pub fn default_scheme() -> Arc<dyn ColorScheme> {
    DEFAULT_SCHEME.read().clone()
}

/// Replaces the process-wide default. Loggers already built keep theirs.
pub fn set_default_scheme(scheme: Arc<dyn ColorScheme>) {
    *DEFAULT_SCHEME.write() = scheme;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_role_indices_are_dense_and_unique() {
        let indices: HashSet<usize> = Role::all().map(Role::index).collect();
        assert_eq!(indices.len(), Role::COUNT);
        assert!(indices.iter().all(|&i| i < Role::COUNT));
    }

    #[test]
    fn test_default_palette_colors_levels() {
        let palette = Palette::default();
        assert_eq!(palette.sgr(Role::Level(Level::Error)), "\x1b[31m");
        assert_eq!(palette.sgr(Role::Level(Level::NoLevel)), "");
    }

    #[test]
    fn test_custom_palette() {
        let mut palette = Palette::monochrome();
        palette.set(Role::Error, "\x1b[4m");
        assert_eq!(palette.sgr(Role::Error), "\x1b[4m");
        assert_eq!(palette.sgr(Role::Key), "");
    }
}
