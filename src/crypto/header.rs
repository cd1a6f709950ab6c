//! Fixed-layout parameter header.
//!
//! ```text
//! MEM_COST (4) | TIME_COST (4) | PARALLELISM (2) | SALT_LEN (4) | KEY_LEN (4)
//! ```
//!
//! All fields are little-endian. The field order is part of the stored
//! format and must never change.

use super::{HEADER_LEN, MEM_LEN, PAR_LEN, SALT_LEN_LEN, TIME_LEN};
use serde::{Deserialize, Serialize};

const MEM_OFFSET: usize = 0;
const TIME_OFFSET: usize = MEM_OFFSET + MEM_LEN;
const PAR_OFFSET: usize = TIME_OFFSET + TIME_LEN;
const SALT_LEN_OFFSET: usize = PAR_OFFSET + PAR_LEN;
const KEY_LEN_OFFSET: usize = SALT_LEN_OFFSET + SALT_LEN_LEN;

/// Cost and shape of an Argon2id derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    memory_cost: u32,
    time_cost: u32,
    parallelism: u8,
    salt_length: u32,
    key_length: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Parameters {
    /// 128 MiB, 3 passes, 4 lanes, 32 byte salt, 32 byte key.
    pub const DEFAULT: Parameters = Parameters {
        memory_cost: 128 * 1024,
        time_cost: 3,
        parallelism: 4,
        salt_length: 32,
        key_length: 32,
    };

    pub const fn new(
        memory_cost: u32,
        time_cost: u32,
        parallelism: u8,
        salt_length: u32,
        key_length: u32,
    ) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
            salt_length,
            key_length,
        }
    }

    /// Memory cost in KiB.
    pub fn memory_cost(&self) -> u32 {
        self.memory_cost
    }

    /// Number of passes over memory.
    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    /// Number of lanes.
    pub fn parallelism(&self) -> u8 {
        self.parallelism
    }

    pub fn salt_length(&self) -> u32 {
        self.salt_length
    }

    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    /// Total length of an envelope carrying these parameters.
    pub fn envelope_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.salt_length) + u64::from(self.key_length)
    }

    /// Serializes the parameters into the fixed header.
    pub fn to_header(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];

        buf[MEM_OFFSET..TIME_OFFSET].copy_from_slice(&self.memory_cost.to_le_bytes());
        buf[TIME_OFFSET..PAR_OFFSET].copy_from_slice(&self.time_cost.to_le_bytes());
        buf[PAR_OFFSET..SALT_LEN_OFFSET]
            .copy_from_slice(&u16::from(self.parallelism).to_le_bytes());
        buf[SALT_LEN_OFFSET..KEY_LEN_OFFSET].copy_from_slice(&self.salt_length.to_le_bytes());
        buf[KEY_LEN_OFFSET..HEADER_LEN].copy_from_slice(&self.key_length.to_le_bytes());

        buf
    }

    /// Reconstructs parameters from a header.
    ///
    /// Any 18 bytes decode; whether the values make sense is decided by the
    /// caller. The parallelism slot is 16 bits wide and only its low byte
    /// is kept.
    pub fn from_header(header: &[u8; HEADER_LEN]) -> Self {
        let parallelism = u16::from_le_bytes([header[PAR_OFFSET], header[PAR_OFFSET + 1]]);

        Self {
            memory_cost: read_u32(header, MEM_OFFSET),
            time_cost: read_u32(header, TIME_OFFSET),
            parallelism: parallelism as u8,
            salt_length: read_u32(header, SALT_LEN_OFFSET),
            key_length: read_u32(header, KEY_LEN_OFFSET),
        }
    }
}

fn read_u32(header: &[u8; HEADER_LEN], offset: usize) -> u32 {
    u32::from_le_bytes([
        header[offset],
        header[offset + 1],
        header[offset + 2],
        header[offset + 3],
    ])
}
