// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming view over a game image.
//!
//! Images can run to several hundred megabytes, so they are never loaded
//! whole. An [`ImageWindow`] reads the backing file in chunks and carries a
//! sparse overlay of edited bytes; the patch engine and settings splicer
//! write into the overlay, and readers (CRC, DIMM upload) see the edited
//! byte stream without the file ever being modified.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{FleetError, Result};

#[derive(Debug)]
enum Source {
    File(std::fs::File),
    Memory(std::io::Cursor<Vec<u8>>),
}

impl Source {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Self::File(f) => {
                f.seek(SeekFrom::Start(offset))?;
                f.read_exact(buf)
            }
            Self::Memory(c) => {
                c.seek(SeekFrom::Start(offset))?;
                c.read_exact(buf)
            }
        }
    }
}

/// A read-only image plus a sparse overlay of edits.
#[derive(Debug)]
pub struct ImageWindow {
    source: Source,
    base_len: u64,
    len: u64,
    overlay: BTreeMap<u64, u8>,
}

impl ImageWindow {
    /// Open an image file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| FleetError::NotFound(format!("{}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| FleetError::Transport(e.to_string()))?
            .len();
        Ok(Self { source: Source::File(file), base_len: len, len, overlay: BTreeMap::new() })
    }

    /// Wrap an in-memory image. Used by the settings splicer tests and the
    /// CRC path when no file backs the data.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self { source: Source::Memory(std::io::Cursor::new(data)), base_len: len, len, overlay: BTreeMap::new() }
    }

    /// Current logical length, including any bytes appended by edits.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read one byte at `offset`, honoring the overlay.
    pub fn byte_at(&mut self, offset: u64) -> Result<u8> {
        if offset >= self.len {
            return Err(FleetError::Patch(format!("offset {offset:#x} out of range")));
        }
        if let Some(b) = self.overlay.get(&offset) {
            return Ok(*b);
        }
        let mut buf = [0u8; 1];
        self.source
            .read_exact_at(offset, &mut buf)
            .map_err(|e| FleetError::Patch(format!("window exhausted at {offset:#x}: {e}")))?;
        Ok(buf[0])
    }

    /// Record an edit run starting at `offset`. Writing past the end grows
    /// the window; the gap (if any) is zero-filled.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.overlay.insert(offset + i as u64, *b);
        }
        let end = offset + bytes.len() as u64;
        if end > self.len {
            for gap in self.len..offset {
                self.overlay.entry(gap).or_insert(0);
            }
            self.len = end;
        }
    }

    /// Read up to `max` bytes at `offset` with the overlay applied. Returns
    /// fewer bytes only at the end of the window.
    pub fn read_chunk(&mut self, offset: u64, max: usize) -> Result<Vec<u8>> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let want = max.min((self.len - offset) as usize);
        let from_file = want.min(self.base_len.saturating_sub(offset) as usize);
        let mut buf = vec![0u8; want];
        if from_file > 0 {
            self.source
                .read_exact_at(offset, &mut buf[..from_file])
                .map_err(|e| FleetError::Transport(format!("image read failed: {e}")))?;
        }
        for (pos, byte) in self.overlay.range(offset..offset + want as u64) {
            buf[(pos - offset) as usize] = *byte;
        }
        Ok(buf)
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
