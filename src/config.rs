use std::path::PathBuf;

/// Recursion limit used when none is configured.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Settings an [`Interpreter`](crate::interpreter::Interpreter) is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prelude script to load instead of the embedded one.
    pub prelude: Option<PathBuf>,
    /// Directories searched, in order, by the default module loader.
    pub search_paths: Vec<PathBuf>,
    /// Collect `print` output in memory instead of writing it to stdout.
    pub capture_output: bool,
    /// Deepest nesting of script calls before a `RecursionError`.
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prelude: None,
            search_paths: vec![PathBuf::from(".")],
            capture_output: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// Default settings with output captured, as embedders and tests use.
    pub fn captured() -> Self {
        Self {
            capture_output: true,
            ..Self::default()
        }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}
