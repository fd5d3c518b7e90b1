use std::io;

use thiserror::Error;

/// Errors raised while building loggers or their resources.
///
/// Logging itself never fails; these only surface from construction and
/// configuration paths, most of which degrade to defaults instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid time layout {layout:?}")]
    TimeLayout { layout: String },

    #[error("{0}")]
    SetLogger(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, Error>;
