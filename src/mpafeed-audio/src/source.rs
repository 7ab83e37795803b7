//! Sequential, seekable byte streams handed to the prober and the decode engine.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Errors raised while locating or opening a byte source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),
    #[error("no such stream: {0}")]
    NotFound(String),
}

/// A readable, rewindable stream of bytes.
///
/// `read` returning `Ok(0)` means end of stream; an `Err` is an I/O failure.
/// Dropping the source closes it.
pub trait ByteSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves to an absolute byte offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek(offset)
    }
}

/// Reads until `buf` is full or the stream ends, retrying interrupted reads.
///
/// Returns the number of bytes placed in `buf`; a short count means end of
/// stream was reached.
pub fn read_block<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// A local file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        tracing::trace!(path = %path.display(), "opened byte source");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), "closed byte source");
    }
}

/// An immutable in-memory stream. Clones share the bytes but not the position.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos.min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos = start + n;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.pos = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(())
    }
}

/// Resolves a location string into an open byte source.
pub trait SourceOpener: Send + Sync {
    fn open(&self, location: &str) -> Result<Box<dyn ByteSource>, SourceError>;
}

/// Opens local paths and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOpener;

impl FileOpener {
    pub fn resolve_path(location: &str) -> Result<PathBuf, SourceError> {
        if let Some(stripped) = location.strip_prefix("file://") {
            return Ok(PathBuf::from(stripped));
        }
        if location.contains("://") {
            return Err(SourceError::UnsupportedLocation(location.to_string()));
        }
        Ok(PathBuf::from(location))
    }
}

impl SourceOpener for FileOpener {
    fn open(&self, location: &str) -> Result<Box<dyn ByteSource>, SourceError> {
        let path = Self::resolve_path(location)?;
        Ok(Box::new(FileSource::open(path)?))
    }
}

/// Named in-memory streams, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.entries
            .write()
            .unwrap()
            .insert(location.into(), data.into());
    }
}

impl SourceOpener for MemoryOpener {
    fn open(&self, location: &str) -> Result<Box<dyn ByteSource>, SourceError> {
        let data = self
            .entries
            .read()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(location.to_string()))?;
        Ok(Box::new(MemorySource::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Hands out at most three bytes per call.
    struct Trickle(MemorySource);

    impl ByteSource for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }

        fn seek(&mut self, offset: u64) -> io::Result<()> {
            self.0.seek(offset)
        }
    }

    #[test]
    fn read_block_fills_across_short_reads() {
        let mut source = Trickle(MemorySource::new((0u8..20).collect::<Vec<_>>()));
        let mut buf = [0u8; 16];
        assert_eq!(read_block(&mut source, &mut buf).unwrap(), 16);
        assert_eq!(buf[15], 15);
        assert_eq!(read_block(&mut source, &mut buf).unwrap(), 4);
        assert_eq!(read_block(&mut source, &mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_source_seeks_and_rewinds() {
        let mut source = MemorySource::new(vec![1u8, 2, 3, 4]);
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 0);

        source.seek(2).unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 4]);

        source.seek(100).unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn file_opener_accepts_paths_and_file_urls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abcdef").unwrap();
        file.flush().unwrap();

        let opener = FileOpener;
        let path = file.path().to_string_lossy().into_owned();
        let mut plain = opener.open(&path).unwrap();
        let mut url = opener.open(&format!("file://{path}")).unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(read_block(&mut plain, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"abcdef");
        url.seek(3).unwrap();
        assert_eq!(read_block(&mut url, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"def");
    }

    #[test]
    fn file_opener_rejects_remote_and_missing() {
        let opener = FileOpener;
        assert!(matches!(
            opener.open("http://example.com/a.mp3"),
            Err(SourceError::UnsupportedLocation(_))
        ));
        assert!(matches!(
            opener.open("/definitely/not/here.mp3"),
            Err(SourceError::Open { .. })
        ));
    }

    #[test]
    fn memory_opener_hands_out_independent_cursors() {
        let opener = MemoryOpener::new();
        opener.insert("a.mp3", vec![9u8; 10]);

        let mut first = opener.open("a.mp3").unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(read_block(&mut first, &mut buf).unwrap(), 10);

        let mut second = opener.open("a.mp3").unwrap();
        assert_eq!(read_block(&mut second, &mut buf).unwrap(), 10);
        assert!(matches!(
            opener.open("b.mp3"),
            Err(SourceError::NotFound(_))
        ));
    }
}
