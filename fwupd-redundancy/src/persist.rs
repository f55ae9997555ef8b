// Licensed under the Apache-2.0 license

//! On-disk priority/purpose persistence, grounded on `serialize.cpp`: each
//! BMC flash id gets its own directory under the persist root holding two
//! JSON-encoded scalar files (spec.md 6: "Persisted priority and purpose at
//! `<persist_root>/<flashId>/priority` and `.../purpose`, JSON-encoded").

use std::path::{Path, PathBuf};

use fwupd_core::manifest::Purpose;

fn flash_dir(persist_root: &Path, flash_id: &str) -> PathBuf {
    persist_root.join(flash_id)
}

pub fn write_priority(persist_root: &Path, flash_id: &str, priority: u8) -> std::io::Result<()> {
    let dir = flash_dir(persist_root, flash_id);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("priority"), serde_json::to_vec(&priority)?)
}

pub fn read_priority(persist_root: &Path, flash_id: &str) -> Option<u8> {
    let bytes = std::fs::read(flash_dir(persist_root, flash_id).join("priority")).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn write_purpose(persist_root: &Path, flash_id: &str, purpose: Purpose) -> std::io::Result<()> {
    let dir = flash_dir(persist_root, flash_id);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join("purpose"),
        serde_json::to_vec(&purpose.to_string())?,
    )
}

pub fn read_purpose(persist_root: &Path, flash_id: &str) -> Option<Purpose> {
    let bytes = std::fs::read(flash_dir(persist_root, flash_id).join("purpose")).ok()?;
    let raw: String = serde_json::from_slice(&bytes).ok()?;
    raw.parse().ok()
}

/// Convenience bundle for startup reconstruction (spec.md 3: "created at
/// startup... from inventory" -- a restarted BMC must not forget the
/// priority/purpose of images already on the controller).
#[derive(Debug, Clone, Copy)]
pub struct PersistedRecord {
    pub priority: u8,
    pub purpose: Purpose,
}

pub fn read_record(persist_root: &Path, flash_id: &str) -> Option<PersistedRecord> {
    Some(PersistedRecord {
        priority: read_priority(persist_root, flash_id)?,
        purpose: read_purpose(persist_root, flash_id)?,
    })
}

/// Enumerate every flash id with a persisted record under the root,
/// skipping directories that never fully wrote both files.
pub fn scan_records(persist_root: &Path) -> Vec<(String, PersistedRecord)> {
    let Ok(entries) = std::fs::read_dir(persist_root) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let flash_id = e.file_name().to_string_lossy().into_owned();
            let record = read_record(persist_root, &flash_id)?;
            Some((flash_id, record))
        })
        .collect()
}
