//! Save state (quick save / quick load) for the peripheral model.
//!
//! Captures the full clocked state (synchronizer chains, receiver FSM,
//! registers, PWM counter) using bincode serialization with deflate
//! compression.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "SPWS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"SPWS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
/// Magic + version
const HEADER_LEN: usize = 8;

// ─── Per-component state structs ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiReceiverState {
    pub sclk_sync: [bool; 2],
    pub copi_sync: [bool; 2],
    pub ncs_sync: [bool; 2],
    pub sclk_prev: bool,
    pub ncs_prev: bool,
    pub shifting: bool,
    pub bit_count: u8,
    pub shift: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFileState {
    pub regs: [u8; 5],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmState {
    pub counter: u32,
    pub active_duty: u8,
}

// ─── Top-level save state ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub config: Config,
    pub tick: u64,
    pub ena: bool,
    pub rst_n: bool,
    /// Last pins presented, `ui_in` layout
    pub ui_in: u8,
    pub outputs: u16,

    pub spi: SpiReceiverState,
    pub regs: RegisterFileState,
    pub pwm: PwmState,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Encode a state with header and deflate compression.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a state, verifying magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState> {
    if data.len() < HEADER_LEN {
        return Err(Error::Truncated { len: data.len() });
    }
    if &data[0..4] != MAGIC {
        return Err(Error::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion { found: version, expected: FORMAT_VERSION });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| Error::Decompress(format!("{:?}", e)))?;

    Ok(bincode::deserialize(&decompressed)?)
}

// ─── File I/O ───────────────────────────────────────────────────────────────

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<()> {
    let bytes = to_bytes(state)?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "save state written");
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState> {
    let data = std::fs::read(path)?;
    let state = from_bytes(&data)?;
    info!(path = %path.display(), tick = state.tick, "save state loaded");
    Ok(state)
}

/// Derive save state file path from a script path.
/// `blink.spw` → `blink.state`; no script → `spi-pwm.state`
pub fn state_path(script_path: Option<&Path>) -> PathBuf {
    match script_path {
        Some(p) => {
            let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("spi-pwm");
            let dir = p.parent().unwrap_or(Path::new("."));
            dir.join(format!("{}.state", stem))
        }
        None => PathBuf::from("spi-pwm.state"),
    }
}
