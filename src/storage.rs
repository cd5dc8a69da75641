use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write as _;
use std::path::Path;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Corrupt(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "storage i/o error: {err}"),
            StorageError::Corrupt(err) => write!(f, "collection file is not valid JSON: {err}"),
        }
    }
}

/// Reads a whole collection file. A missing file is an empty collection.
pub fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).map_err(StorageError::Corrupt),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(StorageError::Io(err)),
    }
}

/// Replaces the whole collection file with a pretty-printed JSON array.
pub fn save_collection<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StorageError> {
    let contents = serde_json::to_string_pretty(records).map_err(StorageError::Corrupt)?;
    atomic_write(path, &contents).map_err(StorageError::Io)
}

/// Creates the collection file holding an empty array if it does not exist yet.
pub fn ensure_collection(path: &Path) -> Result<(), StorageError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            atomic_write(path, "[]").map_err(StorageError::Io)
        }
        Err(err) => Err(StorageError::Io(err)),
    }
}

fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("missing parent directory"))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("collection.json");
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for attempt in 0..10u32 {
        let temp_name = format!(".{}.tmp-{}-{}-{}", file_name, pid, nanos, attempt);
        let temp_path = parent.join(temp_name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())?;
                file.flush()?;
                std::fs::rename(&temp_path, path)?;
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to create temp file",
    ))
}
