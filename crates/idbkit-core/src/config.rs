//! Database, store and index descriptors
//!
//! Descriptors deserialize from the same JSON shape the browser toolkit uses:
//!
//! ```json
//! {
//!   "dbName": "TodoDemoDB",
//!   "version": 1,
//!   "stores": [{ "name": "todos", "keyPath": "id",
//!                "indexes": [{ "name": "by_done", "keyPath": "done" }] }]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::KeyPath;

/// Default schema version.
pub const DEFAULT_VERSION: u32 = 1;

/// Identifies one logical database and the stores it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    pub db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub stores: Vec<StoreConfig>,
    /// Target store. Required when more than one store is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

/// One named store within a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexConfig>,
}

/// Secondary index created alongside its store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub name: String,
    pub key_path: String,
    #[serde(default)]
    pub options: IndexOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
}

impl DbConfig {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            version: None,
            stores: Vec::new(),
            store: None,
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.stores.push(store);
        self
    }

    /// Name the store that operations target.
    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.store = Some(name.into());
        self
    }

    /// Validate the configuration and pick the target store.
    ///
    /// Fails with [`Error::Configuration`] when the configuration is
    /// ambiguous (several stores and no target) or malformed.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        if self.db_name.is_empty() {
            return Err(Error::config("database name must not be empty"));
        }
        let version = self.version.unwrap_or(DEFAULT_VERSION);
        if version == 0 {
            return Err(Error::config("version must be a positive integer"));
        }
        if self.stores.is_empty() {
            return Err(Error::config("at least one store must be configured"));
        }

        let mut names = HashSet::new();
        for store in &self.stores {
            store.validate()?;
            if !names.insert(store.name.as_str()) {
                return Err(Error::config(format!("duplicate store '{}'", store.name)));
            }
        }

        let target = match (&self.store, self.stores.as_slice()) {
            (Some(name), stores) => stores
                .iter()
                .position(|s| &s.name == name)
                .ok_or_else(|| Error::config(format!("store '{}' is not configured", name)))?,
            (None, [_]) => 0,
            (None, _) => {
                return Err(Error::config(
                    "a target store must be specified when several stores are configured",
                ))
            }
        };

        let key_path = self.stores[target].effective_key_path()?;

        Ok(ResolvedConfig {
            db_name: self.db_name,
            version,
            stores: self.stores,
            target,
            key_path,
        })
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: None,
            indexes: Vec::new(),
        }
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn index(mut self, index: IndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// Key path in effect, `"id"` when none was declared.
    pub fn effective_key_path(&self) -> Result<KeyPath> {
        match &self.key_path {
            None => Ok(KeyPath::default()),
            Some(path) => KeyPath::parse(path).ok_or_else(|| {
                Error::config(format!(
                    "invalid key path '{}' for store '{}'",
                    path, self.name
                ))
            }),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("store name must not be empty"));
        }
        self.effective_key_path()?;

        let mut names = HashSet::new();
        for index in &self.indexes {
            if index.name.is_empty() {
                return Err(Error::config(format!(
                    "index name must not be empty in store '{}'",
                    self.name
                )));
            }
            if KeyPath::parse(&index.key_path).is_none() {
                return Err(Error::config(format!(
                    "invalid key path '{}' for index '{}'",
                    index.key_path, index.name
                )));
            }
            if !names.insert(index.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate index '{}' in store '{}'",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl IndexConfig {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            options: IndexOptions::default(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    pub fn multi_entry(mut self) -> Self {
        self.options.multi_entry = true;
        self
    }
}

/// A validated configuration with its target store selected.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    db_name: String,
    version: u32,
    stores: Vec<StoreConfig>,
    target: usize,
    key_path: KeyPath,
}

impl ResolvedConfig {
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Every configured store, in declaration order.
    pub fn stores(&self) -> &[StoreConfig] {
        &self.stores
    }

    /// Name of the store that operations target.
    pub fn store_name(&self) -> &str {
        &self.stores[self.target].name
    }

    /// Key path of the target store.
    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }
}
