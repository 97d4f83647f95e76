// lib/src/store/memory.rs
// In-memory store with copy-on-write transactions and optional MessagePack
// snapshots. A write transaction runs its closure against a clone of the
// tables and commits by swap only on Ok, so a failure rolls back every row
// the closure touched. The single lock serializes writers, which is what the
// multi-row invariants (single active assignment, single active price) rely
// on.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use models::errors::{CareError, CareResult};

use super::Tables;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    internal: Arc<Mutex<Tables>>,
    path: Option<PathBuf>, // For MessagePack persistence
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            internal: Arc::new(Mutex::new(Tables::default())),
            path: None,
        }
    }

    pub fn new_with_path<P: Into<PathBuf>>(path: P) -> Self {
        MemoryStore {
            internal: Arc::new(Mutex::new(Tables::default())),
            path: Some(path.into()),
        }
    }

    /// Reads a store back from a MessagePack snapshot file.
    pub fn from_msgpack_file<P: Into<PathBuf>>(path: P) -> CareResult<Self> {
        let path = path.into();
        let f = File::open(&path).map_err(CareError::Io)?;
        let buf = BufReader::new(f);
        let tables: Tables = rmp_serde::from_read(buf)
            .map_err(|e| CareError::Deserialization(format!("Failed to decode MessagePack: {}", e)))?;
        info!(path = %path.display(), "restored tables from snapshot");
        Ok(MemoryStore {
            internal: Arc::new(Mutex::new(tables)),
            path: Some(path),
        })
    }

    /// Restores from the snapshot when one exists at `path`, otherwise starts
    /// empty and will snapshot there on flush.
    pub fn open<P: Into<PathBuf>>(path: P) -> CareResult<Self> {
        let path = path.into();
        if path.exists() {
            Self::from_msgpack_file(path)
        } else {
            Ok(Self::new_with_path(path))
        }
    }

    fn lock(&self) -> CareResult<MutexGuard<'_, Tables>> {
        self.internal
            .lock()
            .map_err(|e| CareError::Lock(e.to_string()))
    }

    /// Consistent multi-table read.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> CareResult<T>) -> CareResult<T> {
        let guard = self.lock()?;
        f(&guard)
    }

    /// Atomic multi-table write. The closure gets a working copy; an `Err`
    /// leaves the committed tables exactly as they were.
    pub fn write<T>(&self, f: impl FnOnce(&mut Tables) -> CareResult<T>) -> CareResult<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        match f(&mut working) {
            Ok(value) => {
                *guard = working;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "write transaction rolled back");
                Err(err)
            }
        }
    }

    /// Persists the current tables to the snapshot path, atomically via a
    /// temp file rename. A store without a path flushes to nowhere.
    pub fn flush(&self) -> CareResult<()> {
        let guard = self.lock()?;
        self.sync_internal(&guard)
    }

    fn sync_internal(&self, tables: &Tables) -> CareResult<()> {
        if let Some(ref persist_path) = self.path {
            let temp_path = NamedTempFile::new().map_err(CareError::Io)?;
            {
                let mut buf = BufWriter::new(temp_path.as_file());
                rmp_serde::encode::write(&mut buf, tables)
                    .map_err(|e| CareError::Serialization(e.to_string()))?;
            }
            temp_path
                .persist(persist_path)
                .map_err(|e| CareError::Io(e.error))?;
            debug!(path = %persist_path.display(), "tables snapshot written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Bed, CareError};
    use uuid::Uuid;

    #[test]
    fn should_roll_back_every_row_on_error() {
        let store = MemoryStore::new();
        let result: CareResult<()> = store.write(|tables| {
            let bed = Bed::new("B-1", None);
            tables.beds.insert(bed.id, bed);
            let exam = models::CatalogExam::new("CBC", 5_000);
            tables.lab_exams.insert(exam.id, exam);
            Err(CareError::conflict("boom"))
        });
        assert!(result.is_err());
        store
            .read(|tables| {
                assert!(tables.beds.is_empty());
                assert!(tables.lab_exams.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn should_commit_on_ok() {
        let store = MemoryStore::new();
        let bed_id = store
            .write(|tables| {
                let bed = Bed::new("B-2", None);
                let id = bed.id;
                tables.insert_bed(bed)?;
                Ok(id)
            })
            .unwrap();
        store
            .read(|tables| {
                assert!(tables.beds.contains_key(&bed_id));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn should_round_trip_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.msgpack");
        let store = MemoryStore::new_with_path(&path);
        let (product_id, user_id) = store
            .write(|tables| {
                let product = models::PharmacyProduct::new("ORS sachet", 300, 12);
                let product_id = product.id;
                tables.pharmacy_products.insert(product_id, product);
                let user = models::User::from_new_user(models::NewUser {
                    first_name: "Awa".into(),
                    last_name: "Diallo".into(),
                    email: "awa@clinic.test".into(),
                    password: "s3cret-pw".into(),
                    role: models::Role::Reception,
                    phone: None,
                })?;
                let user_id = user.id;
                tables.users.insert(user_id, user);
                Ok((product_id, user_id))
            })
            .unwrap();
        store.flush().unwrap();

        let reloaded = MemoryStore::open(&path).unwrap();
        reloaded
            .read(|tables| {
                let product = tables.require_product(product_id)?;
                assert_eq!(product.stock, 12);
                // Credentials survive a restart, not just the row.
                let user = tables.require_user(user_id)?;
                assert!(user.verify_password("s3cret-pw")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn should_open_empty_store_when_no_snapshot_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("missing.msgpack")).unwrap();
        store
            .read(|tables| {
                assert!(tables.patients.is_empty());
                Ok(())
            })
            .unwrap();
        // Unknown ids still come back as NotFound, not a panic.
        let err = store
            .read(|tables| tables.require_patient(Uuid::new_v4()).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
    }
}
