// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text patch engine.
//!
//! A patch file is line-oriented: blank lines and `#` comments are skipped
//! (except the `# File size: N` assertion), and every other line is a
//! directive of the form
//!
//! ```text
//! 3A5F: 12 34 -> 56 78
//! ```
//!
//! with a hex offset, the expected bytes, and the replacement bytes. A `*`
//! on the left side skips verification of that byte; a `*` on the right
//! side leaves the byte unmodified. Directives apply in file order, files
//! in list order, against the streaming window.

use std::path::Path;

use crate::error::{FleetError, Result};
use crate::window::ImageWindow;

/// One half of a directive byte: a concrete value or a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchByte {
    Value(u8),
    Any,
}

/// A parsed patch line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Replace bytes at an offset after verifying the old contents.
    Change { offset: u64, old: Vec<PatchByte>, new: Vec<PatchByte> },
    /// Assert the total image size.
    FileSize(u64),
}

fn parse_bytes(run: &str, line_no: usize) -> Result<Vec<PatchByte>> {
    run.split_whitespace()
        .map(|tok| {
            if tok == "*" {
                Ok(PatchByte::Any)
            } else {
                u8::from_str_radix(tok, 16)
                    .map(PatchByte::Value)
                    .map_err(|_| FleetError::Patch(format!("line {line_no}: bad byte {tok:?}")))
            }
        })
        .collect()
}

/// Parse patch text into directives.
pub fn parse(text: &str) -> Result<Vec<Directive>> {
    let mut directives = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            let rest = rest.trim();
            if let Some(size) = rest.strip_prefix("File size:") {
                let size = size.trim().parse::<u64>().map_err(|_| {
                    FleetError::Patch(format!("line {line_no}: bad file size {rest:?}"))
                })?;
                directives.push(Directive::FileSize(size));
            }
            continue;
        }
        let (offset, bytes) = line
            .split_once(':')
            .ok_or_else(|| FleetError::Patch(format!("line {line_no}: missing offset")))?;
        let offset = u64::from_str_radix(offset.trim(), 16)
            .map_err(|_| FleetError::Patch(format!("line {line_no}: bad offset {offset:?}")))?;
        let (old, new) = bytes
            .split_once("->")
            .ok_or_else(|| FleetError::Patch(format!("line {line_no}: missing '->'")))?;
        let old = parse_bytes(old, line_no)?;
        let new = parse_bytes(new, line_no)?;
        if old.is_empty() || old.len() != new.len() {
            return Err(FleetError::Patch(format!(
                "line {line_no}: expected equal non-empty byte runs"
            )));
        }
        directives.push(Directive::Change { offset, old, new });
    }
    Ok(directives)
}

/// Apply parsed directives to a window.
pub fn apply(window: &mut ImageWindow, directives: &[Directive]) -> Result<()> {
    for directive in directives {
        match directive {
            Directive::FileSize(size) => {
                if window.len() != *size {
                    return Err(FleetError::Patch(format!(
                        "expected file size {size}, got {}",
                        window.len()
                    )));
                }
            }
            Directive::Change { offset, old, new } => {
                for (i, expect) in old.iter().enumerate() {
                    let pos = offset + i as u64;
                    if let PatchByte::Value(v) = expect {
                        let have = window.byte_at(pos)?;
                        if have != *v {
                            return Err(FleetError::Patch(format!(
                                "mismatch at {pos:#x}: expected {v:02x}, found {have:02x}"
                            )));
                        }
                    }
                }
                for (i, replace) in new.iter().enumerate() {
                    if let PatchByte::Value(v) = replace {
                        window.write_at(offset + i as u64, &[*v]);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Read and apply a list of patch files in order.
pub fn apply_files(window: &mut ImageWindow, paths: &[String]) -> Result<()> {
    for path in paths {
        let text = std::fs::read_to_string(Path::new(path))
            .map_err(|e| FleetError::Patch(format!("{path}: {e}")))?;
        let directives = parse(&text)?;
        apply(window, &directives)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
