//! "Latest recording" symlink maintenance.

use std::io;
use std::path::{Path, PathBuf};

/// Point `link` at `target`, replacing any previous link atomically.
///
/// The link stores the canonical path of `target` so it resolves regardless
/// of the directory `link` lives in.
#[cfg(unix)]
pub fn update_latest_link(link: &Path, target: &Path) -> io::Result<()> {
    let target = std::fs::canonicalize(target)?;
    let staging = staging_path(link);
    match std::fs::remove_file(&staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(&target, &staging)?;
    std::fs::rename(&staging, link)
}

#[cfg(not(unix))]
pub fn update_latest_link(_link: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "latest-recording links require a unix platform",
    ))
}

fn staging_path(link: &Path) -> PathBuf {
    let mut name = link.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    link.with_file_name(name)
}
