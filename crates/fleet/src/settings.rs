// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NAOMI settings splicer.
//!
//! Persisted EEPROM/SRAM contents are installed by splicing a trojan
//! loader into the image: the loader block (magic, kind, payload) is
//! appended past the end of the image and the executable init table in the
//! NAOMI header is pointed at it, so the loader writes the payload into
//! the live EEPROM/SRAM before handing control to the game.

use crate::error::{FleetError, Result};
use crate::window::ImageWindow;

/// Which settings store a blob targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKind {
    Eeprom,
    Sram,
}

pub const EEPROM_SIZE: usize = 128;
pub const SRAM_SIZE: usize = 32 * 1024;

/// Loader block magic, followed by kind tag and payload length.
const SPLICE_MAGIC: &[u8; 4] = b"NBSL";

/// Offset of the init-table slot in the NAOMI header that the loader is
/// hooked through.
const INIT_TABLE_OFFSET: u64 = 0x3C0;

/// Minimal bootstrap that copies the appended payload into the settings
/// store. The real work happens on the target; this is the install stub.
const TROJAN_STUB: &[u8] = &[
    0xE3, 0x03, 0x00, 0xCA, 0x0B, 0x40, 0x2F, 0xD1, 0x09, 0x00, 0x0B, 0x40, 0x22, 0x4F, 0x02,
    0xD2, 0x02, 0xE4, 0x05, 0xC3, 0x09, 0x00, 0x09, 0x00,
];

pub struct SettingsPatcher<'w> {
    window: &'w mut ImageWindow,
}

impl<'w> SettingsPatcher<'w> {
    pub fn new(window: &'w mut ImageWindow) -> Self {
        Self { window }
    }

    /// Splice an EEPROM settings blob (128 bytes).
    pub fn put_eeprom(&mut self, blob: &[u8]) -> Result<()> {
        if blob.len() != EEPROM_SIZE {
            return Err(FleetError::Patch(format!(
                "EEPROM settings must be {EEPROM_SIZE} bytes, got {}",
                blob.len()
            )));
        }
        self.splice(0x01, blob)
    }

    /// Splice an SRAM blob (32 KiB).
    pub fn put_sram(&mut self, blob: &[u8]) -> Result<()> {
        if blob.len() != SRAM_SIZE {
            return Err(FleetError::Patch(format!(
                "SRAM contents must be {SRAM_SIZE} bytes, got {}",
                blob.len()
            )));
        }
        self.splice(0x02, blob)
    }

    fn splice(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        if self.window.len() < INIT_TABLE_OFFSET + 8 {
            return Err(FleetError::Patch("image too small for a NAOMI header".to_owned()));
        }

        // Loader block goes past the current end of the image.
        let block_offset = self.window.len();
        let mut block = Vec::with_capacity(SPLICE_MAGIC.len() + 9 + TROJAN_STUB.len() + payload.len());
        block.extend_from_slice(SPLICE_MAGIC);
        block.push(kind);
        block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        block.extend_from_slice(TROJAN_STUB);
        block.extend_from_slice(payload);
        self.window.write_at(block_offset, &block);

        // Hook the init table at the loader block.
        self.window.write_at(INIT_TABLE_OFFSET, &(block_offset as u32).to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
