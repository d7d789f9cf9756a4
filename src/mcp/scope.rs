//! Teardown scopes
//!
//! A [`TeardownScope`] owns the resources a session acquired, in acquisition
//! order, and releases them newest-first. Release is best-effort: failures
//! are logged and returned, never raised, and the scope is always empty
//! afterwards.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::SessionError;

/// A resource that must be released explicitly.
#[async_trait]
pub trait Teardown: Send + Sync {
    /// Release the resource. Called at most once by the owning scope.
    async fn release(&self) -> Result<(), SessionError>;
}

struct Entry {
    label: &'static str,
    resource: Arc<dyn Teardown>,
}

/// Ordered collection of acquired resources released together.
pub struct TeardownScope {
    owner: String,
    entries: Vec<Entry>,
}

impl TeardownScope {
    /// Create an empty scope; `owner` is only used in diagnostics.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Take ownership of an acquired resource.
    pub fn push(&mut self, label: &'static str, resource: Arc<dyn Teardown>) {
        tracing::trace!(owner = %self.owner, resource = label, "resource acquired");
        self.entries.push(Entry { label, resource });
    }

    /// Labels of held resources, oldest first.
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.label).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every held resource, newest first.
    ///
    /// Returns the failures that occurred; each has already been logged.
    pub async fn close(&mut self) -> Vec<(&'static str, SessionError)> {
        let mut failures = Vec::new();

        while let Some(entry) = self.entries.pop() {
            match entry.resource.release().await {
                Ok(()) => {
                    tracing::trace!(owner = %self.owner, resource = entry.label, "resource released");
                }
                Err(e) => {
                    tracing::warn!(
                        owner = %self.owner,
                        resource = entry.label,
                        error = %e,
                        "failed to release resource"
                    );
                    failures.push((entry.label, e));
                }
            }
        }

        failures
    }
}

impl std::fmt::Debug for TeardownScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownScope")
            .field("owner", &self.owner)
            .field("resources", &self.labels())
            .finish()
    }
}

impl Drop for TeardownScope {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                owner = %self.owner,
                resources = ?self.labels(),
                "teardown scope dropped without being closed"
            );
        }
    }
}
