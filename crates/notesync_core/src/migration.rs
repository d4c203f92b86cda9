//! Schema versioning and migrations.
//!
//! Migrations are forward-only, versioned steps run when a database opens.
//! Each step sees a [`MigrationContext`] describing the stores that exist
//! and records the stores it creates or drops. The database applies the
//! recorded changes and persists the new schema version in the manifest.
//!
//! The built-in schema:
//!
//! | Version | Step |
//! |---|---|
//! | 1 | create the `notes` store |
//! | 2 | create the `sync_queue` store |

use crate::error::{StorageError, StorageResult};
use crate::manifest::Manifest;
use std::collections::{BTreeMap, BTreeSet};

/// Schema version number.
pub type SchemaVersion = u32;

/// Name of the durable note store.
pub const NOTES_STORE: &str = "notes";

/// Name of the sync queue store.
pub const SYNC_QUEUE_STORE: &str = "sync_queue";

/// Store-level changes available to a migration step.
#[derive(Debug)]
pub struct MigrationContext {
    version: SchemaVersion,
    stores: BTreeSet<String>,
    created: Vec<String>,
    dropped: Vec<String>,
}

impl MigrationContext {
    fn new(version: SchemaVersion, stores: BTreeSet<String>) -> Self {
        Self {
            version,
            stores,
            created: Vec::new(),
            dropped: Vec::new(),
        }
    }

    /// Version of the migration being applied.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Returns whether `name` exists at this point of the migration.
    #[must_use]
    pub fn has_store(&self, name: &str) -> bool {
        self.stores.contains(name)
    }

    /// Creates `name` unless it already exists.
    pub fn create_store(&mut self, name: &str) {
        if self.stores.insert(name.to_string()) {
            self.created.push(name.to_string());
        }
    }

    /// Drops `name`, discarding its contents.
    ///
    /// # Errors
    ///
    /// Fails if the store does not exist.
    pub fn drop_store(&mut self, name: &str) -> StorageResult<()> {
        if !self.stores.remove(name) {
            return Err(StorageError::StoreNotFound {
                name: name.to_string(),
            });
        }
        self.created.retain(|created| created != name);
        self.dropped.push(name.to_string());
        Ok(())
    }
}

/// One schema upgrade step.
pub trait Migration: Send + Sync {
    /// Target version of this step. Versions start at 1 and are unique.
    fn version(&self) -> SchemaVersion;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Applies the step.
    ///
    /// # Errors
    ///
    /// Any error aborts the open.
    fn up(&self, ctx: &mut MigrationContext) -> StorageResult<()>;
}

/// A migration that creates one store.
#[derive(Debug, Clone)]
pub struct CreateStore {
    version: SchemaVersion,
    name: String,
    store: &'static str,
}

impl CreateStore {
    /// Creates a step that adds `store` at `version`.
    #[must_use]
    pub fn new(version: SchemaVersion, store: &'static str) -> Self {
        Self {
            version,
            name: format!("create_{store}"),
            store,
        }
    }
}

impl Migration for CreateStore {
    fn version(&self) -> SchemaVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, ctx: &mut MigrationContext) -> StorageResult<()> {
        ctx.create_store(self.store);
        Ok(())
    }
}

/// A migration that ran during an open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Version reached.
    pub version: SchemaVersion,
    /// Migration name.
    pub name: String,
}

/// Outcome of running pending migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Schema version before the run.
    pub from_version: SchemaVersion,
    /// Schema version after the run.
    pub to_version: SchemaVersion,
    /// Steps applied, in order.
    pub applied: Vec<AppliedMigration>,
    /// Stores created by the run.
    pub created_stores: Vec<String>,
    /// Stores dropped by the run.
    pub dropped_stores: Vec<String>,
}

impl MigrationReport {
    /// Returns whether any step ran.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Registry of migrations keyed by version.
#[derive(Default)]
pub struct MigrationManager {
    migrations: BTreeMap<SchemaVersion, Box<dyn Migration>>,
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in note schema.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager
            .migrations
            .insert(1, Box::new(CreateStore::new(1, NOTES_STORE)));
        manager
            .migrations
            .insert(2, Box::new(CreateStore::new(2, SYNC_QUEUE_STORE)));
        manager
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// Fails if the version is 0 or already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> StorageResult<()> {
        let version = migration.version();
        if version == 0 || self.migrations.contains_key(&version) {
            return Err(StorageError::MigrationFailed {
                version,
                message: "version must be unique and non-zero".into(),
            });
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Highest registered version.
    #[must_use]
    pub fn latest_version(&self) -> SchemaVersion {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Runs every step newer than the manifest's schema version and updates
    /// the manifest in place.
    ///
    /// # Errors
    ///
    /// Fails if the manifest is newer than the latest step, or a step fails.
    /// The manifest is left untouched on failure.
    pub fn run(&self, manifest: &mut Manifest) -> StorageResult<MigrationReport> {
        let from_version = manifest.schema_version;
        let latest = self.latest_version();
        if from_version > latest {
            return Err(StorageError::SchemaTooNew {
                found: from_version,
                supported: latest,
            });
        }

        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            ..MigrationReport::default()
        };
        let mut stores = manifest.stores.clone();

        for (version, migration) in self.migrations.range(from_version + 1..) {
            let mut ctx = MigrationContext::new(*version, stores);
            migration
                .up(&mut ctx)
                .map_err(|err| StorageError::MigrationFailed {
                    version: *version,
                    message: err.to_string(),
                })?;

            tracing::info!(version, name = migration.name(), "applied schema migration");

            report.created_stores.retain(|name| !ctx.dropped.contains(name));
            report.created_stores.extend(ctx.created);
            report.dropped_stores.extend(ctx.dropped);
            report.applied.push(AppliedMigration {
                version: *version,
                name: migration.name().to_string(),
            });
            report.to_version = *version;
            stores = ctx.stores;
        }

        manifest.stores = stores;
        manifest.schema_version = report.to_version;
        Ok(report)
    }
}
