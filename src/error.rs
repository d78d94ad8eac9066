use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The host exposes no class of this name. The dependent feature should be disabled.
    #[error("host exposes no class named \"{0}\"")]
    UnknownClassBinding(String),

    #[error("resolved value {value} does not fit the slot type {target}")]
    ValueOutOfRange { value: i64, target: &'static str },

    #[error("invalid signature \"{pattern}\": {reason}")]
    InvalidSignature { pattern: String, reason: String },

    #[error("gamedata entry {group}::{symbol}: {reason}")]
    ConfigParse {
        group: String,
        symbol: String,
        reason: String,
    },

    #[error("slot key {key} is outside the table capacity {capacity}")]
    KeyNotRepresentable { key: u32, capacity: usize },

    #[error("slot key {0} is already associated with another value")]
    SlotOccupied(u32),

    #[error("process \"{0}\" not found")]
    ProcessNotFound(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
