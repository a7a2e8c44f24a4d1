//! Lock and file helpers shared by the core modules.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it. Every guarded structure stays internally consistent between
/// statements, so the data is still usable.
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write `path` through a sibling temp file and rename it into place, so a
/// reader never sees a half-written file.
pub fn write_atomic<E>(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> Result<(), E>,
) -> Result<(), E>
where
    E: From<io::Error>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp)?;
        if let Err(e) = fill(&mut f) {
            drop(f);
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        f.sync_all()?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}
