use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::error::Result;

fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// A fully written temp file awaiting its rename. Dropping without
/// committing removes the temp file, so an aborted batch leaves the
/// destination untouched.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Write `bytes` to a sibling temp file and sync it to disk. The
    /// destination is not touched until [`commit`](Self::commit).
    pub fn stage(dest: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self> {
        let dest = dest.into();
        let tmp = temp_path_for(&dest);
        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(StagedWrite {
            tmp,
            dest,
            committed: false,
        })
    }

    /// Atomically replace the destination with the staged content.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// One-shot temp-write-then-rename for callers that do not stage multiple
/// files together.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    StagedWrite::stage(dest, bytes)?.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_write_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.json");
        fs::write(&dest, b"old").unwrap();

        let staged = StagedWrite::stage(&dest, b"new").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        staged.commit().unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn dropped_stage_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.json");
        fs::write(&dest, b"old").unwrap();

        drop(StagedWrite::stage(&dest, b"new").unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(!temp_path_for(&dest).exists());
    }
}
