//! Error types for host-side operations (save states, scripts, configuration).
//!
//! The peripheral datapath itself has no error channel: invalid addresses,
//! read frames and aborted transactions are silent no-ops.

use thiserror::Error;

/// Result type alias for spi-pwm-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the tooling around the peripheral model
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing a file
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// bincode (de)serialization failure
    #[error("Serialize error: {0}")]
    Serialize(#[from] bincode::Error),

    /// Deflate stream could not be inflated
    #[error("Decompress error: {0}")]
    Decompress(String),

    /// Save state file does not start with the expected magic
    #[error("Invalid save state file (bad magic)")]
    BadMagic,

    /// Save state file is shorter than its header
    #[error("Save state truncated ({len} bytes)")]
    Truncated {
        /// Bytes available
        len: usize,
    },

    /// Save state written by an incompatible format version
    #[error("Unsupported save state version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the header
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// Configuration rejected by [`Config::validate`](crate::Config::validate)
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it
        reason: String,
    },

    /// Frame field out of range (address > 127)
    #[error("Address 0x{address:02X} does not fit in 7 bits")]
    AddressRange {
        /// Offending address
        address: u8,
    },

    /// Script line could not be parsed
    #[error("line {line}: {msg}")]
    Script {
        /// 1-based line number
        line: usize,
        /// Description
        msg: String,
    },

    /// Script `expect*` command did not hold
    #[error("line {line}: expectation failed: {msg}")]
    Expectation {
        /// 1-based line number
        line: usize,
        /// Description
        msg: String,
    },
}
