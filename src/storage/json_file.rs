use serde::{de::DeserializeOwned, Serialize};
use std::{fs, io::Write, path::Path};
use crate::error::{ReclaimError, Result};

/// Read a JSON document, treating a missing file as the default value
pub fn read_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(ReclaimError::persistence(path, e)),
    }
}

/// Replace the document at `path` in one rename so readers never see a partial write
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ReclaimError::persistence(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ReclaimError::persistence(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n").map_err(|e| ReclaimError::persistence(path, e))?;
    tmp.as_file().sync_all().map_err(|e| ReclaimError::persistence(path, e))?;
    tmp.persist(path).map_err(|e| ReclaimError::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: Vec<u32> = read_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_write_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_atomic(&path, &vec![4]).unwrap();

        let value: Vec<u32> = read_or_default(&path).unwrap();
        assert_eq!(value, vec![4]);
        // No temp files left behind
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{not json").unwrap();
        assert!(read_or_default::<Vec<u32>>(&path).is_err());
    }
}
