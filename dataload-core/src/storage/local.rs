// dataload-core/src/storage/local.rs

//! Local filesystem stores.
//!
//! Files are read through a buffered reader, or memory-mapped when they are
//! larger than the configured threshold.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::compression::{decompress, Compression};
use super::traits::{clamp_range, DataStore, StorageReader};
use crate::config::StorageConfig;
use crate::error::{ReaderError, Result};

/// A single file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    id: String,
    /// Buffer size for buffered I/O operations.
    buffer_size: usize,
    /// Whether to use memory-mapped I/O.
    use_mmap: bool,
    /// File size threshold above which to use mmap.
    mmap_threshold: u64,
    compression: Compression,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, config: &StorageConfig) -> Self {
        let path = path.into();
        let id = path.display().to_string();
        Self {
            compression: config.compression.resolve(&id),
            id,
            path,
            buffer_size: config.buffer_size,
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compression of the file, with `infer` already resolved.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn open_raw(&self) -> Result<Box<dyn StorageReader>> {
        let file = File::open(&self.path)
            .map_err(|e| ReaderError::storage_with_source(&self.id, "failed to open file", e))?;

        let meta = file.metadata().map_err(|e| {
            ReaderError::storage_with_source(&self.id, "failed to read file metadata", e)
        })?;
        let size = meta.len();

        // Use mmap for large files if enabled
        if self.use_mmap && size >= self.mmap_threshold && size > 0 {
            // SAFETY: The file is opened read-only and we maintain the Mmap
            // for the lifetime of the reader.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                ReaderError::storage_with_source(&self.id, "failed to memory-map file", e)
            })?;

            Ok(Box::new(MmapReader::new(self.id.clone(), mmap)))
        } else {
            Ok(Box::new(LocalReader::new(
                self.id.clone(),
                file,
                size,
                self.buffer_size,
            )))
        }
    }
}

impl DataStore for FileStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_read(&self) -> Result<Box<dyn StorageReader>> {
        let reader = self.open_raw()?;
        decompress(&self.id, reader, self.compression)
    }
}

/// Expands `path` into the files it names.
///
/// A file is returned as is. A directory is listed in lexicographic order,
/// keeping files whose name ends with `suffix` (when given) and skipping
/// hidden entries. Subdirectories are walked only when `recursive` is set.
pub fn list_files(path: &Path, suffix: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>> {
    let id = path.display().to_string();
    let meta = fs::metadata(path)
        .map_err(|e| ReaderError::storage_with_source(&id, "failed to read metadata", e))?;

    if !meta.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .map_err(|e| ReaderError::storage_with_source(&id, "failed to read directory", e))?
    {
        let entry = entry.map_err(|e| {
            ReaderError::storage_with_source(&id, "failed to read directory entry", e)
        })?;
        entries.push(entry.path());
    }
    entries.sort();

    let mut files = Vec::new();
    for entry in entries {
        let hidden = entry
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden {
            continue;
        }

        if entry.is_dir() {
            if recursive {
                files.extend(list_files(&entry, suffix, recursive)?);
            }
            continue;
        }

        let matches = match suffix {
            Some(suffix) => entry.to_string_lossy().ends_with(suffix),
            None => true,
        };
        if matches {
            files.push(entry);
        }
    }

    Ok(files)
}

/// Buffered file reader for local storage.
struct LocalReader {
    id: String,
    reader: BufReader<File>,
    size: u64,
}

impl LocalReader {
    fn new(id: String, file: File, size: u64, buffer_size: usize) -> Self {
        Self {
            id,
            reader: BufReader::with_capacity(buffer_size, file),
            size,
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let length = clamp_range(self.size, start, length);
        if length == 0 {
            return Ok(Vec::new());
        }

        self.seek(SeekFrom::Start(start)).map_err(|e| {
            ReaderError::storage_with_source(
                &self.id,
                format!("failed to seek to position {start}"),
                e,
            )
        })?;

        let mut buf = vec![0u8; length];
        self.read_exact(&mut buf).map_err(|e| {
            ReaderError::storage_with_source(
                &self.id,
                format!("failed to read {length} bytes at position {start}"),
                e,
            )
        })?;

        Ok(buf)
    }
}

/// Memory-mapped file reader for local storage.
struct MmapReader {
    id: String,
    mmap: Mmap,
    position: u64,
}

impl MmapReader {
    fn new(id: String, mmap: Mmap) -> Self {
        Self {
            id,
            mmap,
            position: 0,
        }
    }
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.mmap.len() as u64;
        let to_read = clamp_range(len, self.position, buf.len());
        if to_read == 0 {
            return Ok(0);
        }

        let pos = self.position as usize;
        buf[..to_read].copy_from_slice(&self.mmap[pos..pos + to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl Seek for MmapReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.mmap.len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            ));
        }

        self.position = new_pos as u64;
        Ok(self.position)
    }
}

impl StorageReader for MmapReader {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let length = clamp_range(self.size(), start, length);
        if length == 0 {
            if start > self.size() {
                tracing::trace!(store = %self.id, start, "read past end of mapped file");
            }
            return Ok(Vec::new());
        }

        let start = start as usize;
        Ok(self.mmap[start..start + length].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn config(use_mmap: bool, mmap_threshold: u64) -> StorageConfig {
        StorageConfig {
            use_mmap,
            mmap_threshold,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_small_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "small.txt", b"Hello, world!");

        let store = FileStore::new(&path, &config(true, 1024));
        assert_eq!(store.id(), path.display().to_string());

        let mut reader = store.open_read().unwrap();
        assert_eq!(reader.size(), 13);

        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello, world!");
    }

    #[test]
    fn test_read_large_file_mmap() {
        let temp_dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
        let path = write_file(temp_dir.path(), "large.bin", &data);

        let store = FileStore::new(&path, &config(true, 1024));
        let mut reader = store.open_read().unwrap();
        assert_eq!(reader.size(), 4096);

        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, data);
    }

    #[test]
    fn test_read_range_both_readers() {
        let temp_dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
        let path = write_file(temp_dir.path(), "data.bin", &data);

        for use_mmap in [false, true] {
            let store = FileStore::new(&path, &config(use_mmap, 1024));
            let mut reader = store.open_read().unwrap();

            assert_eq!(reader.read_range(100, 50).unwrap(), &data[100..150]);
            // Short read at the end of the file.
            assert_eq!(reader.read_range(2040, 50).unwrap(), &data[2040..]);
            assert!(reader.read_range(2048, 10).unwrap().is_empty());
            assert!(reader.read_range(5000, 10).unwrap().is_empty());
        }
    }

    #[test]
    fn test_seek_mmap() {
        let temp_dir = TempDir::new().unwrap();
        let data = vec![7u8; 2048];
        let path = write_file(temp_dir.path(), "seek.bin", &data);

        let store = FileStore::new(&path, &config(true, 1024));
        let mut reader = store.open_read().unwrap();

        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 2038);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 10);

        assert!(reader.seek(SeekFrom::Current(-5000)).is_err());
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "empty.csv", b"");

        let store = FileStore::new(&path, &config(true, 0));
        let mut reader = store.open_read().unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.read_range(0, 16).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let store = FileStore::new("/nonexistent/file.csv", &StorageConfig::default());
        match store.open_read() {
            Err(err) => assert!(matches!(err, ReaderError::Storage { .. })),
            Ok(_) => panic!("opening a missing file must fail"),
        }
    }

    #[test]
    fn test_gzip_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"x,y\n1,2\n").unwrap();
        let compressed = encoder.finish().unwrap();
        let path = write_file(temp_dir.path(), "train.csv.gz", &compressed);

        for use_mmap in [false, true] {
            let store = FileStore::new(&path, &config(use_mmap, 0));
            assert_eq!(store.compression(), Compression::Gzip);
            let mut reader = store.open_read().unwrap();
            let mut content = String::new();
            reader.read_to_string(&mut content).unwrap();
            assert_eq!(content, "x,y\n1,2\n");
        }

        let raw = StorageConfig {
            compression: Compression::None,
            ..Default::default()
        };
        let reader = FileStore::new(&path, &raw).open_read().unwrap();
        assert_eq!(reader.size(), compressed.len() as u64);
    }

    #[test]
    fn test_unsupported_compression_fails_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "train.csv.bz2", b"BZh9");
        let store = FileStore::new(&path, &StorageConfig::default());
        match store.open_read() {
            Err(err) => assert!(matches!(err, ReaderError::NotSupported { .. })),
            Ok(_) => panic!("bzip2 must not be supported"),
        }
    }

    #[test]
    fn test_list_files_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "a.csv", b"1");

        let files = list_files(&path, Some(".txt"), false).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn test_list_files_directory() {
        let temp_dir = TempDir::new().unwrap();
        write_file(temp_dir.path(), "b.csv", b"1");
        write_file(temp_dir.path(), "a.csv", b"1");
        write_file(temp_dir.path(), "notes.txt", b"1");
        write_file(temp_dir.path(), ".hidden.csv", b"1");
        write_file(temp_dir.path(), "nested/c.csv", b"1");

        let files = list_files(temp_dir.path(), Some(".csv"), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);

        let files = list_files(temp_dir.path(), Some(".csv"), true).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[2].ends_with("nested/c.csv"));

        let files = list_files(temp_dir.path(), None, false).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_list_files_missing() {
        let result = list_files(Path::new("/nonexistent/dir"), None, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_object_safety() {
        let store: Box<dyn DataStore> =
            Box::new(FileStore::new("x.csv", &StorageConfig::default()));
        assert_eq!(store.id(), "x.csv");
    }
}
