//! Schema versioning for the cache store
//!
//! The stored version lives in `PRAGMA user_version`. Planning a migration
//! is a pure function of the stored version, the requested version and the
//! tables that already exist, so it can be tested without a database.

use super::StoreError;

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Durable collections in the cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Completed analyses keyed by question id
    Analyses,
    /// Static dataset snapshots keyed by logical name
    StaticSnapshots,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Analyses, Collection::StaticSnapshots];

    /// Table backing this collection
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Analyses => "analyses",
            Collection::StaticSnapshots => "static_snapshots",
        }
    }

    /// First schema version containing this collection
    pub fn introduced_in(&self) -> u32 {
        match self {
            Collection::Analyses => 1,
            Collection::StaticSnapshots => 2,
        }
    }

    /// Statement creating the backing table
    pub(crate) fn create_sql(&self) -> &'static str {
        match self {
            Collection::Analyses => include_str!("../../migrations/001_analyses.sql"),
            Collection::StaticSnapshots => include_str!("../../migrations/002_static_snapshots.sql"),
        }
    }
}

/// What opening the store at a given version has to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Collections to create, in creation order
    pub create: Vec<Collection>,

    /// Version to record once the plan has been applied, if it changes
    pub record_version: Option<u32>,
}

impl MigrationPlan {
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.record_version.is_none()
    }
}

/// Decide what to do when opening a store whose stored version is `stored`
/// (0 for a fresh file) at version `requested`.
///
/// An upgrade creates every collection the requested version defines that
/// is not there yet, and records the new version; existing collections are
/// never touched. Opening at the stored version still repairs a missing
/// collection.
pub fn plan_migration(
    stored: u32,
    requested: u32,
    existing: &[&str],
) -> Result<MigrationPlan, StoreError> {
    if requested == 0 {
        return Err(StoreError::InvalidVersion(requested));
    }
    if requested < stored {
        return Err(StoreError::VersionDowngrade { stored, requested });
    }

    let create = Collection::ALL
        .into_iter()
        .filter(|c| c.introduced_in() <= requested)
        .filter(|c| !existing.contains(&c.table_name()))
        .collect();

    Ok(MigrationPlan {
        create,
        record_version: (requested > stored).then_some(requested),
    })
}
