use std::path::Path;
use std::sync::Arc;

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Error as LmdbError, RwTransaction, Transaction, WriteFlags};
use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::app_response::AppResponse;
use crate::local_db_model::{encode_id, Crime, CrimeRow, StoredRow};
use crate::query::Query;

const MAP_SIZE: usize = 64 * 1024 * 1024;
const MAX_DBS: u32 = 2;
const CRIMES_DB: &str = "crimes";
const META_DB: &str = "crime_meta";
const NEXT_SEQ_KEY: &[u8] = b"next_seq";
const REVISION_KEY: &[u8] = b"revision";

/// The durable crime table.
///
/// One LMDB environment per database name, stored in `<name>.lmdb`. Every
/// write transaction also bumps a revision counter stored next to the rows,
/// so a read knows exactly which revision it observed. Live [`Query`]
/// handles are woken through a watch channel after each commit.
pub struct AppDbState {
    env: Environment,
    crimes: Database,
    meta: Database,
    revision: watch::Sender<u64>,
    path: String,
}

impl AppDbState {
    pub fn init(name: String) -> Result<Self, AppResponse> {
        Self::init_with_map_size(name, MAP_SIZE)
    }

    /// Like [`AppDbState::init`] with an explicit LMDB map size in bytes,
    /// which caps how large the store can grow.
    pub fn init_with_map_size(name: String, map_size: usize) -> Result<Self, AppResponse> {
        let path = format!("{name}.lmdb");
        std::fs::create_dir_all(&path)?;

        info!("Opening crime store at {} (map size {} bytes)", path, map_size);

        let env = Environment::new()
            .set_max_dbs(MAX_DBS)
            .set_map_size(map_size)
            .open(Path::new(&path))?;

        let crimes = env.create_db(Some(CRIMES_DB), DatabaseFlags::empty())?;
        let meta = env.create_db(Some(META_DB), DatabaseFlags::empty())?;

        let current = {
            let txn = env.begin_ro_txn()?;
            let current = read_counter(&txn, meta, REVISION_KEY)?;
            txn.abort();
            current
        };
        let (revision, _) = watch::channel(current);

        Ok(Self { env, crimes, meta, revision, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Inserts the record, or overwrites every field of the existing row.
    ///
    /// Returns the revision the write committed at, once the write
    /// transaction has committed.
    pub fn upsert(&self, crime: &Crime) -> Result<u64, AppResponse> {
        let key = encode_id(&crime.id);
        let mut txn = self.env.begin_rw_txn()?;

        let existing_seq = match txn.get(self.crimes, &key) {
            Ok(bytes) => match StoredRow::from_bytes(bytes) {
                Ok(stored) => Some(stored.seq),
                Err(e) => {
                    warn!("Overwriting unreadable row {}: {}", key, e);
                    None
                }
            },
            Err(LmdbError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let seq = match existing_seq {
            Some(seq) => seq,
            None => {
                let next = read_counter(&txn, self.meta, NEXT_SEQ_KEY)?;
                txn.put(self.meta, &NEXT_SEQ_KEY, &(next + 1).to_le_bytes(), WriteFlags::empty())?;
                next
            }
        };

        let stored = StoredRow { seq, row: CrimeRow::from(crime) };
        txn.put(self.crimes, &key, &stored.to_bytes()?, WriteFlags::empty())?;
        let revision = self.bump_revision(&mut txn)?;
        txn.commit()?;

        debug!("Upserted crime {} (seq {}, revision {})", key, seq, revision);
        self.publish(revision);
        Ok(revision)
    }

    pub fn get_by_id(&self, id: &Uuid) -> Result<Option<Crime>, AppResponse> {
        self.read_by_id(id).map(|(_, found)| found)
    }

    /// All records in insertion order. A single undecodable row fails the
    /// whole read instead of being skipped.
    pub fn get_all(&self) -> Result<Vec<Crime>, AppResponse> {
        self.read_all().map(|(_, crimes)| crimes)
    }

    /// Reads one record together with the revision it was read at.
    pub fn read_by_id(&self, id: &Uuid) -> Result<(u64, Option<Crime>), AppResponse> {
        let key = encode_id(id);
        let txn = self.env.begin_ro_txn()?;

        let revision = read_counter(&txn, self.meta, REVISION_KEY)?;
        let found = match txn.get(self.crimes, &key) {
            Ok(bytes) => Some(StoredRow::from_bytes(bytes)?),
            Err(LmdbError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();

        let crime = found.map(|stored| Crime::try_from(stored.row)).transpose()?;
        Ok((revision, crime))
    }

    /// Reads every record in insertion order together with the revision it
    /// was read at.
    pub fn read_all(&self) -> Result<(u64, Vec<Crime>), AppResponse> {
        let txn = self.env.begin_ro_txn()?;
        let revision = read_counter(&txn, self.meta, REVISION_KEY)?;
        let mut rows = Vec::new();
        {
            let mut cursor = txn.open_ro_cursor(self.crimes)?;
            for (_key, value) in cursor.iter() {
                rows.push(StoredRow::from_bytes(value)?);
            }
        }
        txn.abort();

        rows.sort_by_key(|stored| stored.seq);
        let crimes = rows
            .into_iter()
            .map(|stored| Crime::try_from(stored.row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((revision, crimes))
    }

    pub fn list_all(self: &Arc<Self>) -> Query<Vec<Crime>> {
        Query::new(Arc::clone(self), |state| state.read_all())
    }

    pub fn find_by_id(self: &Arc<Self>, id: Uuid) -> Query<Option<Crime>> {
        Query::new(Arc::clone(self), move |state| state.read_by_id(&id))
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &[u8]) -> Result<u64, AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.crimes, &key, &value, WriteFlags::empty())?;
        let revision = self.bump_revision(&mut txn)?;
        txn.commit()?;
        self.publish(revision);
        Ok(revision)
    }

    /// Flushes pending writes to disk. The environment itself closes when the
    /// last handle is dropped.
    pub fn close_database(&self) -> Result<(), AppResponse> {
        self.env.sync(true)?;
        info!("Crime store at {} synced for close", self.path);
        Ok(())
    }

    fn bump_revision(&self, txn: &mut RwTransaction<'_>) -> Result<u64, AppResponse> {
        let next = read_counter(&*txn, self.meta, REVISION_KEY)? + 1;
        txn.put(self.meta, &REVISION_KEY, &next.to_le_bytes(), WriteFlags::empty())?;
        Ok(next)
    }

    // Writers may finish out of order; the channel only ever moves forward.
    fn publish(&self, revision: u64) {
        self.revision.send_modify(|current| *current = (*current).max(revision));
    }
}

fn read_counter<T: Transaction>(txn: &T, db: Database, key: &[u8]) -> Result<u64, AppResponse> {
    let bytes = match txn.get(db, &key) {
        Ok(bytes) => bytes,
        Err(LmdbError::NotFound) => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| AppResponse::DecodingError(format!("Malformed counter ({} bytes)", bytes.len())))?;
    Ok(u64::from_le_bytes(raw))
}
