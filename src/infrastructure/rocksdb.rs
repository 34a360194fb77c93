use crate::domain::enrollment::{Enrollment, EnrollmentId};
use crate::domain::ports::{EnrollmentFilter, EnrollmentStore};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing enrollments.
pub const CF_ENROLLMENTS: &str = "enrollments";

/// A persistent enrollment store backed by RocksDB.
///
/// Enrollments are stored as JSON under their big-endian id. Reads go straight
/// to the database; inserts and saves take `write_lock` so the existence and
/// version checks cannot interleave with another writer in this process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf = ColumnFamilyDescriptor::new(CF_ENROLLMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_ENROLLMENTS).ok_or_else(|| {
            BillingError::InternalError(Box::new(std::io::Error::other(
                "Enrollments column family not found",
            )))
        })
    }

    fn read(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, enrollment: &Enrollment) -> Result<()> {
        let cf = self.cf()?;
        let value = serde_json::to_vec(enrollment)?;
        self.db.put_cf(cf, enrollment.id.to_be_bytes(), value)?;
        Ok(())
    }

    fn scan(&self, filter: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>> {
        let cf = self.cf()?;
        let mut enrollments = Vec::new();
        // Big-endian keys iterate in id order.
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let enrollment: Enrollment = serde_json::from_slice(&value)?;
            if filter.is_none_or(|f| f.matches(&enrollment)) {
                enrollments.push(enrollment);
            }
        }
        Ok(enrollments)
    }
}

#[async_trait]
impl EnrollmentStore for RocksDBStore {
    async fn insert(&self, enrollment: Enrollment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read(enrollment.id)?.is_some() {
            return Err(BillingError::AlreadyExists(enrollment.id));
        }
        self.write(&enrollment)
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        self.read(id)
    }

    async fn find(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        self.scan(Some(filter))
    }

    async fn all(&self) -> Result<Vec<Enrollment>> {
        self.scan(None)
    }

    async fn save(&self, enrollment: &Enrollment) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read(enrollment.id)?
            .ok_or(BillingError::NotFound(enrollment.id))?;
        if stored.version != enrollment.version {
            return Err(BillingError::PersistenceConflict {
                enrollment: enrollment.id,
                expected: enrollment.version,
                found: stored.version,
            });
        }
        let version = enrollment.version + 1;
        self.write(&Enrollment {
            version,
            ..enrollment.clone()
        })?;
        Ok(version)
    }
}
