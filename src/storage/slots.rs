use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::SlotStem;
use crate::errors::GatewayResult;

/// Owns the storage directory where the extraction backend drops its files.
///
/// Each download works in its own slot, named by a fresh [`SlotStem`]. The
/// backend picks the extension, so a slot's file is found by comparing file
/// stems exactly.
#[derive(Debug, Clone)]
pub struct SlotManager {
    dir: PathBuf,
}

impl SlotManager {
    pub fn new(dir: impl Into<PathBuf>) -> GatewayResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim a fresh slot. Leftovers under the same stem are cleared first,
    /// and the returned guard releases the slot when dropped.
    pub fn reserve(&self) -> GatewayResult<SlotGuard> {
        let stem = SlotStem::generate();
        self.release(&stem)?;
        debug!(slot = %stem, "reserved download slot");

        Ok(SlotGuard {
            slots: self.clone(),
            stem,
        })
    }

    /// Find the file whose stem is exactly `stem`
    pub fn find_file(&self, stem: &SlotStem) -> GatewayResult<Option<PathBuf>> {
        let mut matches: Vec<PathBuf> = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()) {
                matches.push(path);
            }
        }

        if matches.len() > 1 {
            matches.sort();
            warn!(slot = %stem, files = ?matches, "slot holds more than one file");
        }

        Ok(matches.into_iter().next())
    }

    /// Delete everything the slot owns: the file named by the stem plus the
    /// backend's byproducts (`<stem>.part`, `<stem>.f137.mp4`, ...).
    /// Deleting an already-empty slot is not an error.
    pub fn release(&self, stem: &SlotStem) -> GatewayResult<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            let owned = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| belongs_to(name, stem.as_str()));

            if owned {
                remove_file(&path)?;
                debug!(slot = %stem, path = %path.display(), "released slot file");
            }
        }

        Ok(())
    }

    /// Remove files left by slots of an earlier process. Returns how many were deleted.
    pub fn purge_stale(&self) -> GatewayResult<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| name.split('.').next())
                .is_some_and(SlotStem::is_slot_stem);

            if stale {
                remove_file(&path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Scoped ownership of one slot; the slot is released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    slots: SlotManager,
    stem: SlotStem,
}

impl SlotGuard {
    pub fn stem(&self) -> &SlotStem {
        &self.stem
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Err(e) = self.slots.release(&self.stem) {
            warn!(slot = %self.stem, error = %e, "failed to release download slot");
        }
    }
}

fn belongs_to(file_name: &str, stem: &str) -> bool {
    file_name == stem
        || file_name
            .strip_prefix(stem)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn remove_file(path: &Path) -> GatewayResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
