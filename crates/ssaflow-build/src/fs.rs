//! Filesystem boundary used to enumerate and read project files.
//!
//! Paths are plain `/`-separated strings so the same project layout works
//! against the local disk ([`LocalFs`]) and an in-memory tree
//! ([`MemoryFs`], used by tests and by callers that already hold sources).

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::BuildError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub is_dir: bool,
}

pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &str) -> Result<String, BuildError>;

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BuildError>;

    fn stat(&self, path: &str) -> Result<FileInfo, BuildError>;

    /// Every file below `root`, sorted.
    fn walk_files(&self, root: &str) -> Result<Vec<String>, BuildError> {
        let mut out = Vec::new();
        let mut pending = vec![root.to_string()];
        while let Some(dir) = pending.pop() {
            for entry in self.read_dir(&dir)? {
                let path = self.join(&[dir.as_str(), entry.name.as_str()]);
                if entry.is_dir {
                    pending.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn separator(&self) -> char {
        '/'
    }

    fn join(&self, parts: &[&str]) -> String {
        let sep = self.separator();
        let mut out = String::new();
        for part in parts.iter().filter(|p| !p.is_empty() && **p != ".") {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            out.push_str(part.trim_start_matches(sep).trim_end_matches(sep));
        }
        if parts.first().is_some_and(|p| p.starts_with(sep)) {
            out.insert(0, sep);
        }
        out
    }

    /// Extension including the dot, or an empty string.
    fn ext(&self, path: &str) -> String {
        let (_, name) = self.path_split(path);
        match name.rfind('.') {
            Some(i) if i > 0 => name[i..].to_string(),
            _ => String::new(),
        }
    }

    /// Splits into (directory, file name).
    fn path_split(&self, path: &str) -> (String, String) {
        match path.rfind(self.separator()) {
            Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
            None => (String::new(), path.to_string()),
        }
    }
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn read_file(&self, path: &str) -> Result<String, BuildError> {
        std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => BuildError::MissingSource {
                path: path.to_string(),
            },
            _ => BuildError::Io(err),
        })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BuildError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &str) -> Result<FileInfo, BuildError> {
        let meta = std::fs::metadata(path)?;
        Ok(FileInfo {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn walk_files(&self, root: &str) -> Result<Vec<String>, BuildError> {
        let mut out = Vec::new();
        for entry in WalkDir::new(Path::new(root)).sort_by_file_name() {
            let entry = entry.map_err(|e| BuildError::Io(e.into()))?;
            if entry.file_type().is_file() {
                out.push(entry.path().to_string_lossy().replace('\\', "/"));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// In-memory file tree. Directories exist implicitly as path prefixes.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, String>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        self.files
            .insert(path.trim_start_matches("./").to_string(), content.into());
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.add_file(path, content);
        self
    }

    fn normalize(path: &str) -> &str {
        let path = path.trim_start_matches("./").trim_end_matches('/');
        if path == "." {
            ""
        } else {
            path
        }
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &str) -> Result<String, BuildError> {
        self.files
            .get(Self::normalize(path))
            .cloned()
            .ok_or_else(|| BuildError::MissingSource {
                path: path.to_string(),
            })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BuildError> {
        let dir = Self::normalize(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let mut entries: Vec<DirEntry> = Vec::new();
        for file in self.files.keys().filter(|f| f.starts_with(&prefix)) {
            let rest = &file[prefix.len()..];
            let (name, is_dir) = match rest.find('/') {
                Some(i) => (&rest[..i], true),
                None => (rest, false),
            };
            if !entries.iter().any(|e| e.name == name) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    is_dir,
                });
            }
        }
        if entries.is_empty() && !dir.is_empty() {
            return Err(BuildError::MissingSource {
                path: path.to_string(),
            });
        }
        Ok(entries)
    }

    fn stat(&self, path: &str) -> Result<FileInfo, BuildError> {
        let norm = Self::normalize(path);
        if let Some(content) = self.files.get(norm) {
            return Ok(FileInfo {
                size: content.len() as u64,
                is_dir: false,
            });
        }
        self.read_dir(path).map(|_| FileInfo {
            size: 0,
            is_dir: true,
        })
    }
}
