use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub struct Exists<'p> {
    path: &'p Path,
}

impl<'p> Exists<'p> {
    pub fn check<P: AsRef<Path> + ?Sized>(path: &'p P) -> Self { Exists { path: path.as_ref() } }

    pub fn file(&self) -> bool { self.path.is_file() }

    pub fn folder(&self) -> bool { self.path.is_dir() }
}

/// Sibling path used while writing `path`, e.g. `bots_data.json.tmp`
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to a temporary sibling and rename it over `path`.
///
/// The rename is atomic on the same filesystem, so a crash leaves either the
/// previous file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, contents)?;

    let synced = fs::File::open(&temp_path).and_then(|file| file.sync_all());
    if let Err(err) = synced.and_then(|_| fs::rename(&temp_path, path)) {
        if let Err(e) = fs::remove_file(&temp_path) {
            log::warn!("failed to clean up {}: {e}", temp_path.display());
        }
        return Err(err);
    }

    Ok(())
}
