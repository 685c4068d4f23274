//! Engine configuration.

use std::path::{Path, PathBuf};

/// File name of the key database inside [`Box2Config::keyring_path`].
pub const KEYRING_DB: &str = "keyring.db";

/// Configuration for [`Box2`](crate::Box2).
#[derive(Debug, Clone, Default)]
pub struct Box2Config {
    /// Derive DM keys between flat identities instead of triangulated subfeeds.
    pub legacy_mode: bool,
    /// Report every recipient as box2-capable.
    pub always_box2: bool,
    /// Directory for persistent key storage. `None` keeps keys in memory.
    pub keyring_path: Option<PathBuf>,
}

impl Box2Config {
    pub fn with_legacy_mode(mut self, legacy_mode: bool) -> Self {
        self.legacy_mode = legacy_mode;
        self
    }

    pub fn with_always_box2(mut self, always_box2: bool) -> Self {
        self.always_box2 = always_box2;
        self
    }

    pub fn with_keyring_path(mut self, path: impl AsRef<Path>) -> Self {
        self.keyring_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Location of the key database, if persistent.
    pub fn keyring_db(&self) -> Option<PathBuf> {
        self.keyring_path.as_ref().map(|dir| dir.join(KEYRING_DB))
    }
}
