//! TestContext - temporary conf directory per test

use std::path::Path;
use tempfile::TempDir;

/// Context owning the temporary conf directory of one test
///
/// The directory is removed when the context goes out of scope.
///
/// # Example
///
/// ```rust,no_run
/// use specgate_core::testing::TestContext;
///
/// let ctx = TestContext::new();
/// let store = specgate_core::SpecStore::new(ctx.path());
/// ```
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a context with a fresh temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        Self { temp_dir }
    }

    /// Path of the temporary conf directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Give up ownership of the directory handle
    pub fn into_temp_dir(self) -> TempDir {
        self.temp_dir
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
