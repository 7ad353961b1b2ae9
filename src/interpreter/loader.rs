//! Module source lookup for `import`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::trace;

/// Finds the source text of a module given its dotted path.
pub trait ModuleLoader {
    /// `Ok(None)` when no module of that name exists.
    fn load(&self, path: &str) -> io::Result<Option<String>>;
}

/// Resolves `a.b.c` to `<dir>/a/b/c.py` in the first search path that has it.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    search_paths: Vec<PathBuf>,
}

impl FileLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn relative_path(path: &str) -> PathBuf {
        let mut relative: PathBuf = path.split('.').collect();
        relative.set_extension("py");
        relative
    }

    fn candidate(dir: &Path, path: &str) -> PathBuf {
        dir.join(Self::relative_path(path))
    }
}

impl ModuleLoader for FileLoader {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        for dir in &self.search_paths {
            let candidate = Self::candidate(dir, path);
            trace!("looking for {path} at {}", candidate.display());
            match fs::read_to_string(&candidate) {
                Ok(source) => return Ok(Some(source)),
                Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }
}

/// Modules held in memory, keyed by dotted path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    modules: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(path.into(), source.into());
        self
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        Ok(self.modules.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dotted_paths_map_to_nested_files() {
        assert_eq!(FileLoader::relative_path("a.b.c"), PathBuf::from("a/b/c.py"));
        assert_eq!(FileLoader::relative_path("util"), PathBuf::from("util.py"));
    }

    #[test]
    fn file_loader_searches_paths_in_order() {
        let root = std::env::temp_dir().join(format!("pyhost-loader-{}", std::process::id()));
        let (first, second) = (root.join("first"), root.join("second"));
        fs::create_dir_all(second.join("pkg")).expect("mkdir");
        fs::create_dir_all(&first).expect("mkdir");
        fs::write(second.join("pkg").join("tools.py"), "x = 1\n").expect("write");

        let loader = FileLoader::new(vec![first, second]);
        assert_eq!(loader.load("pkg.tools").expect("load").as_deref(), Some("x = 1\n"));
        assert_eq!(loader.load("pkg.missing").expect("load"), None);
        fs::remove_dir_all(root).expect("cleanup");
    }

    #[test]
    fn memory_loader_returns_registered_sources() {
        let loader = MemoryLoader::new().with_module("helpers", "y = 2\n");
        assert_eq!(loader.load("helpers").expect("load").as_deref(), Some("y = 2\n"));
        assert_eq!(loader.load("other").expect("load"), None);
    }
}
