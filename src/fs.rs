//! Storage the server reads resources from and writes uploads to
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};


/// Filesystem collaborator
///
/// Paths are the decoded request resources, always starting with `/`.
pub trait Filesystem {
    /// Size of the file in bytes
    fn stat(&mut self, path: &str) -> io::Result<u64>;
    /// Reads up to `buf.len()` bytes at `offset`, returns count read
    fn read(&mut self, path: &str, offset: u64, buf: &mut [u8])
        -> io::Result<usize>;
    /// Creates the file, truncating an existing one
    fn create(&mut self, path: &str) -> io::Result<()>;
    /// Appends to an existing file
    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()>;
    fn delete(&mut self, path: &str) -> io::Result<()>;
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file", path))
}

/// Files kept in memory, keyed by resource path
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> MemoryFs {
        MemoryFs::default()
    }
    /// Adds or replaces a file
    pub fn insert<P: Into<String>, D: Into<Vec<u8>>>(&mut self, path: P, data: D)
    {
        self.files.insert(path.into(), data.into());
    }
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| &v[..])
    }
}

impl Filesystem for MemoryFs {
    fn stat(&mut self, path: &str) -> io::Result<u64> {
        self.files.get(path).map(|v| v.len() as u64)
            .ok_or_else(|| not_found(path))
    }
    fn read(&mut self, path: &str, offset: u64, buf: &mut [u8])
        -> io::Result<usize>
    {
        let data = self.files.get(path).ok_or_else(|| not_found(path))?;
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
    fn create(&mut self, path: &str) -> io::Result<()> {
        self.files.insert(path.to_string(), Vec::new());
        Ok(())
    }
    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        self.files.get_mut(path).ok_or_else(|| not_found(path))?
            .extend_from_slice(data);
        Ok(())
    }
    fn delete(&mut self, path: &str) -> io::Result<()> {
        self.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }
}

/// Files under a directory of the host filesystem
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new<P: Into<PathBuf>>(root: P) -> DirFs {
        DirFs { root: root.into() }
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(io::Error::new(io::ErrorKind::PermissionDenied,
                    format!("{}: path escapes the served directory", path))),
            }
        }
        Ok(self.root.join(relative))
    }
}

impl Filesystem for DirFs {
    fn stat(&mut self, path: &str) -> io::Result<u64> {
        let meta = fs::metadata(self.resolve(path)?)?;
        if !meta.is_file() {
            return Err(not_found(path));
        }
        Ok(meta.len())
    }
    fn read(&mut self, path: &str, offset: u64, buf: &mut [u8])
        -> io::Result<usize>
    {
        let mut file = File::open(self.resolve(path)?)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
    fn create(&mut self, path: &str) -> io::Result<()> {
        File::create(self.resolve(path)?).map(|_| ())
    }
    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        OpenOptions::new().append(true).open(self.resolve(path)?)?
            .write_all(data)
    }
    fn delete(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }
}

#[cfg(test)]
mod test {
    use std::env;
    use std::fs;
    use std::io;
    use std::process;

    use super::{DirFs, Filesystem, MemoryFs};

    #[test]
    fn memory_roundtrip() {
        let mut fs = MemoryFs::new();
        assert_eq!(fs.stat("/a").unwrap_err().kind(), io::ErrorKind::NotFound);
        fs.create("/a").unwrap();
        fs.write("/a", b"hello ").unwrap();
        fs.write("/a", b"world").unwrap();
        assert_eq!(fs.stat("/a").unwrap(), 11);
        let mut buf = [0u8; 4];
        assert_eq!(fs.read("/a", 6, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"worl");
        assert_eq!(fs.read("/a", 20, &mut buf).unwrap(), 0);
        fs.delete("/a").unwrap();
        assert!(fs.delete("/a").is_err());
    }

    #[test]
    fn dir_rejects_parent() {
        let mut fs = DirFs::new("/tmp");
        assert_eq!(fs.stat("/../etc/passwd").unwrap_err().kind(),
                   io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn dir_roundtrip() {
        let root = env::temp_dir()
            .join(format!("packet-http-fs-{}", process::id()));
        fs::create_dir_all(&root).unwrap();
        let mut dir = DirFs::new(&root);
        dir.create("/upload.txt").unwrap();
        dir.write("/upload.txt", b"data").unwrap();
        assert_eq!(dir.stat("/upload.txt").unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(dir.read("/upload.txt", 1, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"ata");
        dir.delete("/upload.txt").unwrap();
        fs::remove_dir_all(&root).unwrap();
    }
}
