//! Database container
//!
//! A `Db` owns a directory of collection log files and hands out shared
//! collection handles. Opening a collection replays its log; reopening a
//! name returns the existing handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::collection::{Collection, CollectionOptions};
use crate::errors::{DbError, DbResult};
use crate::observability::Logger;

/// Global options inherited by every collection.
#[derive(Debug, Clone, Copy)]
pub struct DbOptions {
    /// Total object cache budget per collection, in serialized bytes.
    pub cache_size: usize,
    /// Per-document cache cap; larger documents bypass the cache.
    pub cache_max_obj_size: usize,
    /// Array-aware matching and indexing.
    pub search_in_array: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        let defaults = CollectionOptions::default();
        DbOptions {
            cache_size: defaults.cache_size,
            cache_max_obj_size: defaults.cache_max_obj_size,
            search_in_array: defaults.search_in_array,
        }
    }
}

pub struct Db {
    path: PathBuf,
    options: DbOptions,
    collections: Mutex<HashMap<String, Collection>>,
}

impl Db {
    /// Opens (or creates) the database directory.
    pub fn open(path: impl Into<PathBuf>, options: DbOptions) -> DbResult<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| {
            crate::log::StorageError::io(
                format!("failed to create database directory {}", path.display()),
                e,
            )
        })?;
        Logger::info("DB_OPEN", &[("path", &path.display().to_string())]);
        Ok(Db {
            path,
            options,
            collections: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the named collection, opening and replaying it on first
    /// access.
    pub async fn collection(&self, name: &str) -> DbResult<Collection> {
        validate_name(name)?;
        let mut collections = self.collections.lock().await;
        if let Some(existing) = collections.get(name) {
            return Ok(existing.clone());
        }
        let collection = Collection::open(
            &self.path.join(name),
            name,
            CollectionOptions {
                cache_size: self.options.cache_size,
                cache_max_obj_size: self.options.cache_max_obj_size,
                search_in_array: self.options.search_in_array,
            },
        )?;
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Drops a collection and deletes its log file. Returns whether
    /// anything existed to drop.
    pub async fn drop_collection(&self, name: &str) -> DbResult<bool> {
        validate_name(name)?;
        let mut collections = self.collections.lock().await;
        let had_handle = collections.remove(name).is_some();

        let file = self.path.join(name);
        let had_file = match std::fs::remove_file(&file) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(crate::log::StorageError::io(
                    format!("failed to remove collection log {}", file.display()),
                    e,
                )
                .into())
            }
        };
        Ok(had_handle || had_file)
    }
}

/// Collection names become file names, so path metacharacters and the
/// reserved `$` prefix are rejected.
fn validate_name(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('$')
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidCollectionName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("users").is_ok());
        assert!(validate_name("users_2026-08.bak").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("$cmd").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
