use crate::domain::enrollment::{Enrollment, EnrollmentId};
use crate::domain::ports::{EnrollmentFilter, EnrollmentStore};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for enrollments.
///
/// Uses `Arc<RwLock<HashMap<EnrollmentId, Enrollment>>>` to allow shared
/// concurrent access. The version check in `save` runs under the write lock,
/// so it is atomic with the write itself.
#[derive(Default, Clone)]
pub struct InMemoryEnrollmentStore {
    enrollments: Arc<RwLock<HashMap<EnrollmentId, Enrollment>>>,
}

impl InMemoryEnrollmentStore {
    /// Creates a new, empty in-memory enrollment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn insert(&self, enrollment: Enrollment) -> Result<()> {
        let mut enrollments = self.enrollments.write().await;
        if enrollments.contains_key(&enrollment.id) {
            return Err(BillingError::AlreadyExists(enrollment.id));
        }
        enrollments.insert(enrollment.id, enrollment);
        Ok(())
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(&id).cloned())
    }

    async fn find(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut found: Vec<Enrollment> = enrollments
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.id);
        Ok(found)
    }

    async fn all(&self) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut all: Vec<Enrollment> = enrollments.values().cloned().collect();
        all.sort_by_key(|e| e.id);
        Ok(all)
    }

    async fn save(&self, enrollment: &Enrollment) -> Result<u64> {
        let mut enrollments = self.enrollments.write().await;
        let stored = enrollments
            .get_mut(&enrollment.id)
            .ok_or(BillingError::NotFound(enrollment.id))?;
        if stored.version != enrollment.version {
            return Err(BillingError::PersistenceConflict {
                enrollment: enrollment.id,
                expected: enrollment.version,
                found: stored.version,
            });
        }
        let version = enrollment.version + 1;
        *stored = Enrollment {
            version,
            ..enrollment.clone()
        };
        Ok(version)
    }
}
