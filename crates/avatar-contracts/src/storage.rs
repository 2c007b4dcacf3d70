use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

/// String-keyed, string-valued local storage, the same contract a browser's
/// `localStorage` offers.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// A JSON object file mapping keys to string values.
///
/// Every read goes back to disk, and writes merge into the on-disk object so
/// two stores sharing a file never drop each other's keys. A file that exists
/// but does not parse is an error on read; the next write moves it aside to
/// `<name>.corrupt` before starting a fresh object.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn corrupt_copy_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let payload = read_json_object(&self.path)?.unwrap_or_default();
        Ok(payload.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut on_disk = match read_json_object(&self.path) {
            Ok(payload) => payload.unwrap_or_default(),
            Err(_) => {
                let aside = self.corrupt_copy_path();
                fs::rename(&self.path, &aside).with_context(|| {
                    format!("failed to move unreadable {} aside", self.path.display())
                })?;
                Map::new()
            }
        };
        if on_disk.get(key).and_then(Value::as_str) == Some(value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).set(key, value)
    }
}

/// `Ok(None)` when the file does not exist yet.
fn read_json_object(path: &Path) -> anyhow::Result<Option<Map<String, Value>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match parsed {
        Value::Object(payload) => Ok(Some(payload)),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

/// Writes through a sibling temp file and renames it over `path`, so readers
/// never see a half-written object.
fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage a write in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut staged, payload)?;
    staged.flush()?;
    staged
        .persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_values() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFileStore::new(temp.path().join("nested").join("storage.json"));
        assert_eq!(store.get("key")?, None);
        store.set("key", "[1,2]")?;
        assert_eq!(store.get("key")?.as_deref(), Some("[1,2]"));
        Ok(())
    }

    #[test]
    fn file_store_merges_with_concurrent_writer() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let store_a = JsonFileStore::new(&path);
        let store_b = JsonFileStore::new(&path);

        store_a.set("a", "1")?;
        store_b.set("b", "2")?;
        store_a.set("c", "3")?;

        let reloaded = JsonFileStore::new(path);
        assert_eq!(reloaded.get("a")?.as_deref(), Some("1"));
        assert_eq!(reloaded.get("b")?.as_deref(), Some("2"));
        assert_eq!(reloaded.get("c")?.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn truncated_file_is_a_read_error_and_kept_aside_on_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let truncated = r#"{"avatar-history": "[{\"svg\":"#;
        fs::write(&path, truncated)?;
        let store = JsonFileStore::new(&path);

        let err = store.get("avatar-history").err().map(|err| format!("{err:#}"));
        assert!(err.is_some_and(|err| err.contains("failed to parse")));

        store.set("avatar-history", "[]")?;
        assert_eq!(store.get("avatar-history")?.as_deref(), Some("[]"));
        assert_eq!(fs::read_to_string(store.corrupt_copy_path())?, truncated);
        assert!(store.corrupt_copy_path().ends_with("storage.json.corrupt"));
        Ok(())
    }

    #[test]
    fn non_object_file_is_a_read_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        fs::write(&path, "[1, 2]")?;
        assert!(JsonFileStore::new(&path).get("key").is_err());
        Ok(())
    }

    #[test]
    fn writes_leave_no_staging_files_behind() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFileStore::new(temp.path().join("storage.json"));
        store.set("a", "1")?;
        store.set("b", "2")?;

        let names: Vec<String> = fs::read_dir(temp.path())?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, vec!["storage.json".to_string()]);
        Ok(())
    }

    #[test]
    fn memory_store_is_usable_through_reference() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let borrowed = &store;
        borrowed.set("k", "v")?;
        assert_eq!(store.get("k")?.as_deref(), Some("v"));
        Ok(())
    }
}
