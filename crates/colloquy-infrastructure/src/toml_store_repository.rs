//! TOML-based StoreRepository implementation

use crate::dto::{StoreV1_0_0, StoreV2_0_0};
use async_trait::async_trait;
use colloquy_core::session::{StoreRepository, StoreSnapshot};
use colloquy_core::{ColloquyError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use version_migrate::{FromDomain, IntoDomain, MigratesTo};

/// A repository implementation persisting the whole session store as one
/// TOML file.
///
/// - Uses DTOs (StoreV2_0_0) for persistence
/// - Handles migration from the legacy sentinel-based format (V1.0.0)
/// - An unreadable store degrades to an empty one instead of failing the
///   load; the dashboard must come up even over corrupt state
pub struct TomlStoreRepository {
    base_dir: PathBuf,
}

impl TomlStoreRepository {
    /// Creates a new `TomlStoreRepository` rooted at the given directory.
    ///
    /// The directory is created if it does not exist:
    /// ```text
    /// base_dir/
    /// └── store.toml
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Creates a `TomlStoreRepository` at the default location
    /// (~/.colloquy).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or
    /// the directory cannot be created.
    pub fn default_location() -> Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| ColloquyError::io("failed to get home directory"))?;
        Self::new(home_dir.join(".colloquy"))
    }

    fn store_file_path(&self) -> PathBuf {
        self.base_dir.join("store.toml")
    }

    /// Parses TOML content into the latest DTO, auto-detecting the
    /// version and migrating when necessary.
    fn parse_store(&self, toml_content: &str) -> Option<StoreV2_0_0> {
        if let Ok(v2_0_0) = toml::from_str::<StoreV2_0_0>(toml_content) {
            Some(v2_0_0)
        } else if let Ok(v1_0_0) = toml::from_str::<StoreV1_0_0>(toml_content) {
            tracing::info!("migrating session store from V1.0.0 to V2.0.0");
            Some(v1_0_0.migrate())
        } else {
            None
        }
    }
}

#[async_trait]
impl StoreRepository for TomlStoreRepository {
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dto = StoreV2_0_0::from_domain(snapshot.clone());
        let toml_content = toml::to_string_pretty(&dto)?;
        fs::write(self.store_file_path(), toml_content)?;
        Ok(())
    }

    async fn load(&self) -> Result<StoreSnapshot> {
        let file_path = self.store_file_path();
        if !file_path.exists() {
            return Ok(StoreSnapshot::default());
        }

        let toml_content = fs::read_to_string(&file_path)?;
        match self.parse_store(&toml_content) {
            Some(dto) => Ok(dto.into_domain()),
            None => {
                tracing::warn!(
                    "unparseable session store at {:?}, starting empty",
                    file_path
                );
                Ok(StoreSnapshot::default())
            }
        }
    }
}
