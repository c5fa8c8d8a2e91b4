//! Framed, checksummed JSON records.
//!
//! A file starts with a header:
//!
//! ```text
//! [magic: b"MULS"][version: 1 byte]
//! ```
//!
//! followed by one or more frames:
//!
//! ```text
//! [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{Read, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageError;

/// Current codec version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying muloss files.
pub const MAGIC: [u8; 4] = *b"MULS";

/// Largest frame payload accepted on decode (16 MiB).
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

fn corrupt(reason: impl Into<String>) -> StorageError {
    StorageError::Corrupt { reason: reason.into() }
}

/// Serializes `value` into one frame.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value cannot be encoded or is too large.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(StorageError::Serialization(format!(
            "frame of {} bytes exceeds maximum {MAX_FRAME_SIZE}",
            data.len()
        )));
    }
    let len = u32::try_from(data.len()).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Reads one frame and deserializes it, verifying the checksum.
///
/// # Errors
///
/// - `StorageError::Corrupt` for an unsupported version, an oversized frame or a CRC mismatch
/// - `StorageError::Io` if the reader ends early
/// - `StorageError::Serialization` if the payload is not the expected JSON
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, StorageError> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(corrupt(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(corrupt(format!("frame size {len} exceeds maximum {MAX_FRAME_SIZE}")));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(corrupt(format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}")));
    }

    serde_json::from_slice(&data).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Writes the file header.
///
/// # Errors
///
/// Returns `StorageError::Io` on write failure.
pub fn write_header(writer: &mut impl Write) -> Result<(), StorageError> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    Ok(())
}

/// Reads and validates the file header, returning its version.
///
/// # Errors
///
/// Returns `StorageError::Corrupt` for bad magic bytes or an unsupported version.
pub fn read_header(reader: &mut impl Read) -> Result<u8, StorageError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(corrupt(format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}")));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(corrupt(format!("unsupported file version: {}", version[0])));
    }
    Ok(version[0])
}
