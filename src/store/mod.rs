//! Store facade over a redb database.
//!
//! Every operation runs in its own redb transaction. Operations come in two
//! flavours:
//! - `try_*` methods return a [`Result`] and leave error handling to the
//!   caller.
//! - the plain methods never fail. They log the error, keep it in a bounded
//!   side channel (see [`Store::take_errors`]) and return the "nothing
//!   happened" result: `false`, `None` or `0`.

use crate::encoding::key::{is_numeric_key, Key, StoreKey, TruncatedKey, KEY_MARKER};
use crate::encoding::value::{BincodeCodec, ValueCodec};
use crate::error::{Error, Result};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

pub mod config;
pub mod scan;

pub use config::StoreConfig;
pub use scan::{page_window, Page};

type RecordTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// Typed key-value store backed by one redb table.
///
/// The `C` parameter is the codec used by typed reads and writes.
pub struct Store<C = BincodeCodec> {
    db: Database,
    config: StoreConfig,
    codec: C,
    name: String,
    next_key: AtomicU32,
    errors: Mutex<VecDeque<Error>>,
}

impl Store<BincodeCodec> {
    /// Opens (or creates) the database file at `path`.
    ///
    /// The allocation counter is rebuilt from the numeric keys already
    /// stored in the file.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Database::builder();
        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }
        let db = builder.create(path)?;

        Self::init(db, config, path.display().to_string())
    }

    /// Creates a store kept entirely in memory.
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        let mut builder = Database::builder();
        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }
        let db = builder.create_with_backend(InMemoryBackend::new())?;

        Self::init(db, config, ":memory:".to_string())
    }

    /// Wraps an already opened database.
    ///
    /// The cache size is fixed when a database is opened, so a config with
    /// `cache_size` set is rejected here.
    pub fn from_database(db: Database, config: StoreConfig) -> Result<Self> {
        if config.cache_size.is_some() {
            return Err(Error::InvalidConfig(
                "cache size cannot be applied to an opened database".to_string(),
            ));
        }
        let name = config.table_name.clone();
        Self::init(db, config, name)
    }

    fn init(db: Database, config: StoreConfig, name: String) -> Result<Self> {
        let table: RecordTable<'_> = TableDefinition::new(config.table_name.as_str());

        let write_txn = db.begin_write()?;
        write_txn.open_table(table)?;
        write_txn.commit()?;

        let next_key = recover_next_key(&db, table)?;
        debug!(store = %name, table = %config.table_name, next_key, "store opened");

        Ok(Self {
            db,
            config,
            codec: BincodeCodec,
            name,
            next_key: AtomicU32::new(next_key),
            errors: Mutex::new(VecDeque::new()),
        })
    }
}

/// Finds the first free numeric key: one past the largest stored one.
///
/// When `u32::MAX` itself is stored there is nothing past it, so the lowest
/// unused key is returned instead.
fn recover_next_key(db: &Database, table: RecordTable<'_>) -> Result<u32> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(table)?;

    let mut max: Option<u32> = None;
    for_each_numeric_key(&table, |value| {
        max = Some(max.map_or(value, |current| current.max(value)));
    })?;

    let Some(max) = max else {
        return Ok(0);
    };
    if let Some(next) = max.checked_add(1) {
        return Ok(next);
    }

    let mut used = Vec::new();
    for_each_numeric_key(&table, |value| used.push(value))?;
    used.sort_unstable();
    used.dedup();

    let mut candidate = 0u32;
    for value in used {
        if value != candidate {
            break;
        }
        candidate = candidate.wrapping_add(1);
    }

    warn!(next_key = candidate, "largest numeric key is in use, reusing the lowest free key");
    Ok(candidate)
}

fn for_each_numeric_key<T>(table: &T, mut each: impl FnMut(u32)) -> Result<()>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    for entry in table.range(KEY_MARKER.as_slice()..)? {
        let (key, _) = entry?;
        let key = key.value();
        if !key.starts_with(&KEY_MARKER) {
            break;
        }
        if is_numeric_key(key) {
            each(Key::decode(key).value());
        }
    }
    Ok(())
}

impl<C> Store<C> {
    /// Replaces the value codec.
    ///
    /// Entries written with a different codec will fail to decode and are
    /// treated as absent.
    pub fn with_codec<D: ValueCodec>(self, codec: D) -> Store<D> {
        Store {
            db: self.db,
            config: self.config,
            codec,
            name: self.name,
            next_key: self.next_key,
            errors: self.errors,
        }
    }

    /// Human readable name used in log records (path, `:memory:` or table).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the codec used for typed values.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn table(&self) -> RecordTable<'_> {
        TableDefinition::new(self.config.table_name.as_str())
    }

    /// Hands out a fresh numeric key.
    ///
    /// Keys are issued in increasing order and never repeat within the
    /// process, unless [`delete_all`](Self::delete_all) resets the counter.
    pub fn allocate_key(&self) -> Key {
        Key::new(self.next_key.fetch_add(1, Ordering::SeqCst))
    }

    /// Drains the errors swallowed by the infallible operations, oldest first.
    pub fn take_errors(&self) -> Vec<Error> {
        let mut errors = self.errors.lock().unwrap_or_else(|err| err.into_inner());
        errors.drain(..).collect()
    }

    fn record(&self, op: &'static str, key: &[u8], err: Error) {
        warn!(store = %self.name, key = %TruncatedKey(key), op, error = %err, "store operation failed");

        let capacity = self.config.error_log_capacity;
        if capacity == 0 {
            return;
        }

        let mut errors = self.errors.lock().unwrap_or_else(|err| err.into_inner());
        while errors.len() >= capacity {
            errors.pop_front();
        }
        errors.push_back(err);
    }

    fn absorb<T>(&self, op: &'static str, key: &[u8], result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(op, key, err);
                None
            }
        }
    }

    // Byte level primitives shared by every key kind.

    fn exists_bytes(&self, key: &[u8]) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;
        Ok(table.get(key)?.is_some())
    }

    fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;
        let data = table.get(key)?.map(|guard| guard.value().to_vec());
        Ok(data)
    }

    fn put_bytes(&self, key: &[u8], data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.insert(key, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_bytes(&self, key: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Removes `key` only if it still holds `expected`, so a write that
    /// landed after `expected` was read is kept.
    fn remove_if_unchanged(&self, key: &[u8], expected: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            let unchanged = table
                .get(key)?
                .map_or(false, |guard| guard.value() == expected);
            if unchanged {
                table.remove(key)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Returns true if an entry exists under `key`.
    pub fn try_exists<K: StoreKey>(&self, key: K) -> Result<bool> {
        self.exists_bytes(&key.key_bytes())
    }

    /// Returns true if an entry exists under `key`; false on any failure.
    pub fn exists<K: StoreKey>(&self, key: K) -> bool {
        let key = key.key_bytes();
        self.absorb("exists", &key, self.exists_bytes(&key))
            .unwrap_or(false)
    }

    /// Removes the entry under `key`. Removing a missing entry is not an error.
    pub fn try_delete<K: StoreKey>(&self, key: K) -> Result<()> {
        self.remove_bytes(&key.key_bytes())
    }

    /// Removes the entry under `key`.
    pub fn delete<K: StoreKey>(&self, key: K) {
        let key = key.key_bytes();
        self.absorb("delete", &key, self.remove_bytes(&key));
    }

    /// Removes every entry and resets the key counter to zero.
    ///
    /// The counter is reset even if clearing the table fails.
    pub fn try_delete_all(&self) -> Result<()> {
        self.next_key.store(0, Ordering::SeqCst);

        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(self.table())?;
        write_txn.open_table(self.table())?;
        write_txn.commit()?;

        debug!(store = %self.name, "all entries deleted");
        Ok(())
    }

    /// Removes every entry and resets the key counter to zero.
    pub fn delete_all(&self) {
        let result = self.try_delete_all();
        self.absorb("delete_all", &[], result);
    }

    /// Returns the stored bytes without decoding them.
    pub fn try_get_raw<K: StoreKey>(&self, key: K) -> Result<Option<Vec<u8>>> {
        self.get_bytes(&key.key_bytes())
    }

    /// Returns the stored bytes without decoding them, `None` if absent.
    pub fn get_raw<K: StoreKey>(&self, key: K) -> Option<Vec<u8>> {
        let key = key.key_bytes();
        self.absorb("get_raw", &key, self.get_bytes(&key)).flatten()
    }

    /// Stores bytes verbatim.
    pub fn try_set_raw<K: StoreKey>(&self, key: K, data: &[u8]) -> Result<()> {
        self.put_bytes(&key.key_bytes(), data)
    }

    /// Stores bytes verbatim.
    pub fn set_raw<K: StoreKey>(&self, key: K, data: &[u8]) {
        let key = key.key_bytes();
        self.absorb("set_raw", &key, self.put_bytes(&key, data));
    }
}

impl<C: ValueCodec> Store<C> {
    fn get_value<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        let Some(data) = self.get_bytes(key)? else {
            return Ok(None);
        };

        match self.codec.decode(&data) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(store = %self.name, key = %TruncatedKey(key), error = %err, "deleting undecodable entry");
                if let Err(remove_err) = self.remove_if_unchanged(key, &data) {
                    self.record("get", key, remove_err);
                }
                Err(Error::Decode(err))
            }
        }
    }

    fn set_value<T: Serialize + ?Sized>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = self.codec.encode(value).map_err(Error::Encode)?;
        self.put_bytes(key, &data)
    }

    /// Reads and decodes the value under `key`.
    ///
    /// An entry that fails to decode is deleted before the
    /// [`Error::Decode`] is returned.
    pub fn try_get<T: DeserializeOwned, K: StoreKey>(&self, key: K) -> Result<Option<T>> {
        self.get_value(&key.key_bytes())
    }

    /// Reads and decodes the value under `key`.
    ///
    /// Returns `None` when the key is absent, when the read fails, and when
    /// the stored bytes do not decode. Undecodable entries are deleted.
    pub fn get<T: DeserializeOwned, K: StoreKey>(&self, key: K) -> Option<T> {
        let key = key.key_bytes();
        self.absorb("get", &key, self.get_value(&key)).flatten()
    }

    /// Decodes the value under `key` into `target`.
    ///
    /// `target` is reset to its default first, so it stays at the default
    /// whenever `false` (not found) is returned.
    pub fn get_into<T: DeserializeOwned + Default, K: StoreKey>(
        &self,
        key: K,
        target: &mut T,
    ) -> bool {
        *target = T::default();
        match self.get(key) {
            Some(value) => {
                *target = value;
                true
            }
            None => false,
        }
    }

    /// Encodes `value` and stores it under `key`.
    pub fn try_set<T: Serialize + ?Sized, K: StoreKey>(&self, key: K, value: &T) -> Result<()> {
        self.set_value(&key.key_bytes(), value)
    }

    /// Encodes `value` and stores it under `key`. Failures are only logged.
    pub fn set<T: Serialize + ?Sized, K: StoreKey>(&self, key: K, value: &T) {
        let key = key.key_bytes();
        self.absorb("set", &key, self.set_value(&key, value));
    }

    /// Visits the decoded entries whose key starts with `prefix`.
    ///
    /// # Arguments
    /// * `prefix` - Key prefix to scan, empty for the whole table
    /// * `page` - Page to visit; [`Page::all`] visits everything unsorted
    /// * `filter` - Predicate over raw keys, `None` accepts every key
    /// * `visit` - Called with the raw key and decoded value, in ascending
    ///   key order when paged
    ///
    /// # Returns
    /// Number of keys under `prefix` accepted by `filter`, regardless of the
    /// page. Entries that cannot be read or decoded are skipped.
    pub fn try_scan<T, P, F>(
        &self,
        prefix: P,
        page: Page,
        filter: Option<&dyn Fn(&[u8]) -> bool>,
        mut visit: F,
    ) -> Result<usize>
    where
        T: DeserializeOwned,
        P: AsRef<[u8]>,
        F: FnMut(&[u8], T),
    {
        let prefix = prefix.as_ref();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;

        let mut keys: Vec<Vec<u8>> = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, _) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            if filter.map_or(true, |accept| accept(key)) {
                keys.push(key.to_vec());
            }
        }

        let total = keys.len();

        if page.is_paged() {
            keys.sort_unstable();
            let window = page_window(keys.len(), page);
            keys.truncate(window.end);
            keys.drain(..window.start);
        }

        for key in &keys {
            let data = match table.get(key.as_slice()) {
                Ok(Some(guard)) => guard.value().to_vec(),
                Ok(None) => continue,
                Err(err) => {
                    self.record("scan", key, err.into());
                    continue;
                }
            };

            match self.codec.decode::<T>(&data) {
                Ok(value) => visit(key.as_slice(), value),
                Err(err) => self.record("scan", key, Error::Decode(err)),
            }
        }

        Ok(total)
    }

    /// Same as [`try_scan`](Self::try_scan), returning 0 if the scan could
    /// not start.
    pub fn scan<T, P, F>(
        &self,
        prefix: P,
        page: Page,
        filter: Option<&dyn Fn(&[u8]) -> bool>,
        visit: F,
    ) -> usize
    where
        T: DeserializeOwned,
        P: AsRef<[u8]>,
        F: FnMut(&[u8], T),
    {
        let prefix = prefix.as_ref();
        let result = self.try_scan(prefix, page, filter, visit);
        self.absorb("scan", prefix, result).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::BincodeCodec;
    use serde::Deserialize;
    use std::sync::atomic::AtomicBool;
    use std::sync::Barrier;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        stars: u32,
    }

    fn store() -> Store {
        Store::in_memory(StoreConfig::default()).unwrap()
    }

    fn note(title: &str, stars: u32) -> Note {
        Note {
            title: title.to_string(),
            stars,
        }
    }

    #[test]
    fn test_allocate_sequence() {
        let store = store();
        let keys: Vec<u32> = (0..5).map(|_| store.allocate_key().value()).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_delete_all_resets_counter() {
        let store = store();
        let key = store.allocate_key();
        store.set(key, &note("a", 1));
        store.allocate_key();

        store.delete_all();

        assert_eq!(store.allocate_key(), Key::new(0));
        assert!(!store.exists(key));
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_get_missing() {
        let store = store();
        assert_eq!(store.get::<Note, _>(Key::new(3)), None);
        assert_eq!(store.get::<Note, _>("missing"), None);
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_get_into_resets_target() {
        let store = store();
        let mut target = note("stale", 9);
        assert!(!store.get_into(Key::new(1), &mut target));
        assert_eq!(target, Note::default());

        store.set(Key::new(1), &note("fresh", 2));
        assert!(store.get_into(Key::new(1), &mut target));
        assert_eq!(target, note("fresh", 2));
    }

    #[test]
    fn test_set_get_numeric_and_string() {
        let store = store();
        store.set(Key::new(7), &note("numeric", 1));
        store.set("user:alice", &note("string", 2));

        assert_eq!(store.get(Key::new(7)), Some(note("numeric", 1)));
        assert_eq!(store.get("user:alice"), Some(note("string", 2)));
        assert!(store.exists(Key::new(7)));
        assert!(store.exists("user:alice"));
        assert!(!store.exists(Key::new(8)));
    }

    #[test]
    fn test_delete() {
        let store = store();
        store.set("gone", &note("x", 0));
        store.delete("gone");
        assert!(!store.exists("gone"));

        // Deleting twice is harmless
        store.delete("gone");
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_raw_accessors() {
        let store = store();
        assert_eq!(store.get_raw(Key::new(1)), None);

        store.set_raw(Key::new(1), b"\x00\x01\x02");
        assert_eq!(store.get_raw(Key::new(1)), Some(vec![0, 1, 2]));

        store.set(Key::new(2), &42u64);
        assert_eq!(store.get_raw(Key::new(2)), Some(42u64.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_corrupt_entry_is_deleted() {
        let store = store();
        store.set_raw("broken", b"\x01");

        assert_eq!(store.get::<Note, _>("broken"), None);
        assert!(!store.exists("broken"));

        let errors = store.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_decode());
    }

    #[test]
    fn test_try_get_reports_decode_error() {
        let store = store();
        store.set_raw("broken", b"\x01");

        let result = store.try_get::<Note, _>("broken");
        assert!(matches!(result, Err(Error::Decode(_))));
        assert_eq!(store.try_get::<Note, _>("broken").unwrap(), None);
    }

    #[test]
    fn test_error_log_capacity() {
        let config = StoreConfig::new("records", None, 2).unwrap();
        let store = Store::in_memory(config).unwrap();
        for name in ["a", "b", "c"] {
            store.set_raw(name, b"\x01");
            assert_eq!(store.get::<Note, _>(name), None);
        }
        assert_eq!(store.take_errors().len(), 2);
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_error_log_disabled() {
        let config = StoreConfig::new("records", None, 0).unwrap();
        let store = Store::in_memory(config).unwrap();
        store.set_raw("a", b"\x01");
        assert_eq!(store.get::<Note, _>("a"), None);
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_json_codec() {
        let store = store().with_codec(crate::JsonCodec);
        store.set("doc", &note("json", 5));
        assert_eq!(
            store.get_raw("doc"),
            Some(br#"{"title":"json","stars":5}"#.to_vec())
        );
        assert_eq!(store.get("doc"), Some(note("json", 5)));
    }

    #[test]
    fn test_scan_filters_and_counts() {
        let store = store();
        for (i, name) in ["post:a", "post:b", "post:c", "user:a"].iter().enumerate() {
            store.set(*name, &note(name, i as u32));
        }

        let mut seen = Vec::new();
        let total = store.scan("post:", Page::all(), None, |key, value: Note| {
            seen.push((key.to_vec(), value.stars));
        });
        assert_eq!(total, 3);
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (b"post:a".to_vec(), 0),
                (b"post:b".to_vec(), 1),
                (b"post:c".to_vec(), 2),
            ]
        );

        let not_b = |key: &[u8]| !key.ends_with(b"b");
        let total = store.scan("post:", Page::new(0, 10), Some(&not_b), |_, _: Note| {});
        assert_eq!(total, 2);
    }

    /// Bincode codec whose first decode pauses until another thread has
    /// had a chance to write.
    struct PausingCodec {
        armed: AtomicBool,
        decoding: Barrier,
        resume: Barrier,
    }

    impl ValueCodec for PausingCodec {
        fn encode<T: Serialize + ?Sized>(&self, value: &T) -> std::result::Result<Vec<u8>, CodecError> {
            BincodeCodec.encode(value)
        }

        fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> std::result::Result<T, CodecError> {
            let result = BincodeCodec.decode(data);
            if self.armed.swap(false, Ordering::SeqCst) {
                self.decoding.wait();
                self.resume.wait();
            }
            result
        }
    }

    #[test]
    fn test_corrupt_cleanup_keeps_concurrent_write() {
        let store = store().with_codec(PausingCodec {
            armed: AtomicBool::new(true),
            decoding: Barrier::new(2),
            resume: Barrier::new(2),
        });
        store.set_raw("k", b"\x01");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                store.codec().decoding.wait();
                store.set("k", &7u64);
                store.codec().resume.wait();
            });

            assert_eq!(store.get::<u64, _>("k"), None);
        });

        assert_eq!(store.get::<u64, _>("k"), Some(7));
    }

    #[test]
    fn test_from_database_rejects_cache_size() {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .unwrap();
        let config = StoreConfig::new("records", Some(1024), 8).unwrap();
        assert!(matches!(
            Store::from_database(db, config),
            Err(Error::InvalidConfig(_))
        ));

        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .unwrap();
        let store = Store::from_database(db, StoreConfig::default()).unwrap();
        assert_eq!(store.name(), "records");
        assert_eq!(store.allocate_key(), Key::new(0));
    }
}
