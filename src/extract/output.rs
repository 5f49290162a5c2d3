use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::audio::types::TimestampSequence;
use crate::error::{OutputError, Result};

/// Digits after the decimal point in every record
pub const DECIMALS: usize = 4;

/// One output line: seconds with four decimals, LF-terminated
pub fn format_record(seconds: f64) -> String {
    // keep -0.0 from rendering as "-0.0000"
    let seconds = if seconds == 0.0 { 0.0 } else { seconds };
    format!("{:.*}\n", DECIMALS, seconds)
}

/// Full file body for a timestamp sequence
pub fn render(timestamps: &TimestampSequence) -> String {
    timestamps.iter().map(|&t| format_record(t)).collect()
}

/// Writes timestamp files, optionally through a temp file and rename
#[derive(Debug, Clone, Copy)]
pub struct TimestampWriter {
    atomic: bool,
}

impl TimestampWriter {
    pub fn new(atomic: bool) -> Self {
        Self { atomic }
    }

    /// Replace the contents of `path` with one record per timestamp
    pub fn write<P: AsRef<Path>>(&self, path: P, timestamps: &TimestampSequence) -> Result<()> {
        let path = path.as_ref();
        let body = render(timestamps);
        let unwritable = |e: std::io::Error| OutputError::Unwritable {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if self.atomic {
            // A symlinked output keeps its link; the rename lands on the target
            let target = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            let parent = match target.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };

            // Dropping the temp file on any error path removes it
            let mut tmp = Self::temp_file_in(&parent).map_err(unwritable)?;
            if let Ok(existing) = std::fs::metadata(&target) {
                tmp.as_file().set_permissions(existing.permissions()).map_err(unwritable)?;
            }
            tmp.write_all(body.as_bytes()).map_err(unwritable)?;
            tmp.as_file().sync_all().map_err(unwritable)?;
            tmp.persist(&target).map_err(|e| unwritable(e.error))?;
        } else {
            let mut writer = BufWriter::new(File::create(path).map_err(unwritable)?);
            writer.write_all(body.as_bytes()).map_err(unwritable)?;
            writer.flush().map_err(unwritable)?;
        }

        tracing::debug!("Wrote {} records ({} bytes) to {:?}", timestamps.len(), body.len(), path);
        Ok(())
    }

    /// Temp file in `dir` created with the mode `File::create` would use
    fn temp_file_in(dir: &Path) -> io::Result<NamedTempFile> {
        let mut builder = Builder::new();
        builder.prefix(".timestamps").suffix(".tmp");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // narrowed by the process umask at creation
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }

        builder.tempfile_in(dir)
    }
}

impl Default for TimestampWriter {
    fn default() -> Self {
        Self::new(true)
    }
}
