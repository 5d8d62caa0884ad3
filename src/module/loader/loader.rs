//! Module loader implementation
//!
//! Reads module bytes from disk together with an optional precomputed digest
//! and hands them to the module cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::registry::{LoadedModule, ModuleCache};
use crate::module::traits::ScriptError;

/// Extension of the sidecar file holding a module's hex digest
pub const HASH_SIDECAR_EXTENSION: &str = "sha256";

/// Module bytes as read from disk
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// Digest from the sidecar file, if one was present
    pub precomputed_hash: Option<String>,
}

/// Loader feeding module files into the cache
pub struct ModuleLoader {
    cache: Arc<ModuleCache>,
}

impl ModuleLoader {
    pub fn new(cache: Arc<ModuleCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Read a module file and its `<file>.sha256` sidecar
    ///
    /// The sidecar holds the hex digest as its first whitespace-separated
    /// token. An unreadable or empty sidecar is ignored.
    pub fn read_script<P: AsRef<Path>>(path: P) -> Result<ScriptSource, ScriptError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ScriptError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

        let sidecar = Self::sidecar_path(path);
        let precomputed_hash = if sidecar.exists() {
            match std::fs::read_to_string(&sidecar) {
                Ok(content) => content.split_whitespace().next().map(str::to_string),
                Err(e) => {
                    warn!("Ignoring unreadable hash sidecar {}: {}", sidecar.display(), e);
                    None
                }
            }
        } else {
            None
        };

        debug!(
            "Read {} ({} bytes, precomputed hash: {})",
            path.display(),
            bytes.len(),
            precomputed_hash.is_some()
        );
        Ok(ScriptSource {
            path: path.to_path_buf(),
            bytes,
            precomputed_hash,
        })
    }

    /// Read a module file and load it through the cache
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<LoadedModule>, ScriptError> {
        let source = Self::read_script(path)?;
        let module = self
            .cache
            .try_load(&source.bytes, source.precomputed_hash.as_deref())?;
        info!("Loaded {} as {}", source.path.display(), module.hash().short());
        Ok(module)
    }

    /// Path of the digest sidecar for a module file
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(HASH_SIDECAR_EXTENSION);
        PathBuf::from(name)
    }
}
