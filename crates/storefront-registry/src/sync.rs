//! Reconciliation of a desired asset set against what a prefix holds
//!
//! Shared by the site synchronizer (desired set from a manifest) and the
//! build worker (desired set from a local build directory). Callers apply
//! every addition before any removal so a live site never misses an asset
//! that both the old and the new build contain.

use std::collections::HashSet;
use tracing::debug;

use crate::error::Result;
use crate::storage::ObjectStore;

/// Paths to write and paths to delete, relative to one prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Every desired path, in the order given
    pub additions: Vec<String>,
    /// Actual paths absent from the desired set, sorted
    pub removals: Vec<String>,
}

impl SyncPlan {
    pub fn new<D, A>(desired: D, actual: A) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        let additions: Vec<String> = desired.into_iter().map(Into::into).collect();
        let wanted: HashSet<&str> = additions.iter().map(String::as_str).collect();

        let mut removals: Vec<String> = actual
            .into_iter()
            .map(Into::into)
            .filter(|path| !wanted.contains(path.as_str()))
            .collect();
        removals.sort();
        removals.dedup();

        Self {
            additions,
            removals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Every key below `prefix`, returned relative to it
pub async fn list_relative<S>(store: &S, bucket: &str, prefix: &str) -> Result<Vec<String>>
where
    S: ObjectStore + ?Sized,
{
    let listing = store.list(bucket, prefix, None).await?;
    let paths: Vec<String> = listing
        .keys
        .iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect();

    debug!(bucket, prefix, count = paths.len(), "Listed existing objects");
    Ok(paths)
}

/// Delete `removals` below `prefix`, stopping at the first failure
pub async fn apply_removals<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
    removals: &[String],
) -> Result<usize>
where
    S: ObjectStore + ?Sized,
{
    for path in removals {
        let key = format!("{}{}", prefix, path);
        store.delete(bucket, &key).await?;
        debug!(bucket, key = %key, "Deleted stale object");
    }
    Ok(removals.len())
}
