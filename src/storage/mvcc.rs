use std::{
    collections::{HashSet, VecDeque},
    ops::Bound,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    storage::{
        engine::{Engine, prefix_range},
        keycode::{self, Decoder},
    },
};

/// Transaction version number type
pub type Version = u64;

/// MVCC storage engine wrapper
///
/// Uses the underlying storage engine (Engine trait) for CRUD operations.
pub struct Mvcc<E: Engine> {
    engine: Arc<Mutex<E>>,
}

impl<E: Engine> Clone for Mvcc<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

impl<E: Engine> Mvcc<E> {
    pub fn new(eng: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(eng)),
        }
    }

    pub fn begin(&self) -> Result<MvccTransaction<E>> {
        MvccTransaction::begin(self.engine.clone())
    }
}

/// MVCC transaction
pub struct MvccTransaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
}

/// Transaction state for MVCC visibility checks
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub version: Version,
    pub active_versions: HashSet<Version>,
}

impl TransactionState {
    fn is_visible(&self, version: Version) -> bool {
        if self.active_versions.contains(&version) {
            return false;
        }
        version <= self.version
    }
}

/// MVCC key types for storage operations
#[derive(Debug, PartialEq)]
pub enum MvccKey {
    /// Next version counter
    NextVersion,
    /// Active transaction marker
    TxnActive(Version),
    /// Write set entry for rollback
    TxnWrite(Version, Vec<u8>),
    /// Versioned data key
    Version(Vec<u8>, Version),
}

impl MvccKey {
    /// Encodes the key so byte order matches (tag, fields) order
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            MvccKey::NextVersion => out.push(0x00),
            MvccKey::TxnActive(version) => {
                out.push(0x01);
                keycode::encode_u64(&mut out, *version);
            }
            MvccKey::TxnWrite(version, key) => {
                out.push(0x02);
                keycode::encode_u64(&mut out, *version);
                keycode::encode_bytes(&mut out, key);
            }
            MvccKey::Version(key, version) => {
                out.push(0x03);
                keycode::encode_bytes(&mut out, key);
                keycode::encode_u64(&mut out, *version);
            }
        }
        out
    }

    /// Decodes bytes back to a key
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let key = match decoder.take_u8()? {
            0x00 => MvccKey::NextVersion,
            0x01 => MvccKey::TxnActive(decoder.take_u64()?),
            0x02 => {
                let version = decoder.take_u64()?;
                MvccKey::TxnWrite(version, decoder.take_bytes()?)
            }
            0x03 => {
                let key = decoder.take_bytes()?;
                MvccKey::Version(key, decoder.take_u64()?)
            }
            tag => return Err(Error::Internal(format!("unknown mvcc key tag {}", tag))),
        };
        decoder.finish()?;
        Ok(key)
    }
}

/// MVCC key prefixes for prefix scanning
///
/// Tags line up with `MvccKey` so a prefix matches the keys it names.
#[derive(Debug)]
pub enum MvccKeyPrefix {
    TxnActive,
    TxnWrite(Version),
    /// Every version of every key starting with the given raw bytes
    Version(Vec<u8>),
}

impl MvccKeyPrefix {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            MvccKeyPrefix::TxnActive => out.push(0x01),
            MvccKeyPrefix::TxnWrite(version) => {
                out.push(0x02);
                keycode::encode_u64(&mut out, *version);
            }
            MvccKeyPrefix::Version(prefix) => {
                out.push(0x03);
                keycode::encode_bytes_prefix(&mut out, prefix);
            }
        }
        out
    }
}

impl<E: Engine> MvccTransaction<E> {
    /// Begins a new transaction
    pub fn begin(eng: Arc<Mutex<E>>) -> Result<Self> {
        let mut engine = eng.lock()?;

        let next_version = match engine.get(MvccKey::NextVersion.encode())? {
            Some(value) => bincode::deserialize(&value)?,
            None => 1,
        };

        engine.set(
            MvccKey::NextVersion.encode(),
            bincode::serialize(&(next_version + 1))?,
        )?;

        let active_versions = Self::scan_active(&mut engine)?;

        engine.set(MvccKey::TxnActive(next_version).encode(), vec![])?;
        drop(engine);

        debug!(version = next_version, active = active_versions.len(), "begin mvcc transaction");
        Ok(Self {
            engine: eng,
            state: TransactionState {
                version: next_version,
                active_versions,
            },
        })
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    /// Commits the transaction (cleans up metadata only)
    pub fn commit(&self) -> Result<()> {
        let mut engine = self.engine.lock()?;

        let mut delete_keys = Vec::new();
        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnWrite(self.state.version).encode());
        while let Some((key, _)) = iter.next().transpose()? {
            delete_keys.push(key);
        }
        drop(iter);

        for key in delete_keys.into_iter() {
            engine.delete(key)?;
        }

        engine.delete(MvccKey::TxnActive(self.state.version).encode())
    }

    /// Rolls back the transaction (deletes all data and metadata)
    pub fn rollback(&self) -> Result<()> {
        let mut engine = self.engine.lock()?;
        let mut delete_keys = Vec::new();

        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnWrite(self.state.version).encode());
        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::TxnWrite(_, raw_key) => {
                    delete_keys.push(MvccKey::Version(raw_key, self.state.version).encode());
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key: {:?}", other)))
                }
            }
            delete_keys.push(key);
        }
        drop(iter);

        for key in delete_keys.into_iter() {
            engine.delete(key)?;
        }

        engine.delete(MvccKey::TxnActive(self.state.version).encode())
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write_inner(key, value)
    }

    /// Gets the value for a key respecting MVCC visibility
    pub fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let mut engine = self.engine.lock()?;

        let from = MvccKey::Version(key.clone(), 0).encode();
        let to = MvccKey::Version(key, self.state.version).encode();
        let mut iter = engine.scan(from..=to).rev();

        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::Version(_, version) => {
                    if self.state.is_visible(version) {
                        return Ok(Some(value));
                    }
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key: {:?}", other)))
                }
            }
        }
        Ok(None)
    }

    /// Streams keys with the given raw prefix, yielding the newest visible
    /// version of each key in key order.
    ///
    /// The engine lock is taken once per `batch_size` raw entries and never
    /// held between calls to `next()`.
    pub fn scan_prefix(&self, prefix: Vec<u8>, batch_size: usize) -> MvccScan<E> {
        let (start, end) = prefix_range(&MvccKeyPrefix::Version(prefix).encode());
        MvccScan {
            engine: self.engine.clone(),
            state: self.state.clone(),
            cursor: start,
            end,
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            pending: None,
            exhausted: false,
        }
    }

    fn write_inner(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut engine = self.engine.lock()?;

        let from = MvccKey::Version(
            key.clone(),
            self.state
                .active_versions
                .iter()
                .min()
                .copied()
                .unwrap_or(self.state.version + 1),
        )
        .encode();
        let to = MvccKey::Version(key.clone(), u64::MAX).encode();

        // Conflict detection: check for newer versions
        if let Some((k, _)) = engine.scan(from..=to).last().transpose()? {
            match MvccKey::decode(&k)? {
                MvccKey::Version(_, version) => {
                    if !self.state.is_visible(version) {
                        return Err(Error::WriteConflict);
                    }
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key: {:?}", other)))
                }
            }
        }

        engine.set(MvccKey::TxnWrite(self.state.version, key.clone()).encode(), vec![])?;

        engine.set(MvccKey::Version(key, self.state.version).encode(), value)?;

        Ok(())
    }

    fn scan_active(engine: &mut MutexGuard<E>) -> Result<HashSet<Version>> {
        let mut active_versions = HashSet::new();
        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnActive.encode());

        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(&key)? {
                MvccKey::TxnActive(version) => {
                    active_versions.insert(version);
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key: {:?}", other)))
                }
            }
        }
        Ok(active_versions)
    }
}

/// Scan result containing key-value pair
#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Streaming snapshot scan returned by `MvccTransaction::scan_prefix`.
pub struct MvccScan<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
    /// Lower bound of the next batch
    cursor: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    batch_size: usize,
    buffer: VecDeque<ScanResult>,
    /// Raw key whose versions are still being read, with its newest
    /// visible value so far
    pending: Option<(Vec<u8>, Option<Vec<u8>>)>,
    exhausted: bool,
}

impl<E: Engine> MvccScan<E> {
    fn fill(&mut self) -> Result<()> {
        let engine = self.engine.clone();
        let mut engine = engine.lock()?;
        let mut iter = engine.scan((self.cursor.clone(), self.end.clone()));

        let mut fetched = 0;
        while fetched < self.batch_size {
            let Some((key, value)) = iter.next().transpose()? else {
                self.exhausted = true;
                break;
            };
            fetched += 1;

            let (raw_key, version) = match MvccKey::decode(&key)? {
                MvccKey::Version(raw_key, version) => (raw_key, version),
                other => {
                    return Err(Error::Internal(format!("unexpected key: {:?}", other)))
                }
            };
            self.cursor = Bound::Excluded(key);

            if self.pending.as_ref().map(|(k, _)| k) != Some(&raw_key) {
                self.flush();
                self.pending = Some((raw_key, None));
            }
            if self.state.is_visible(version) {
                if let Some((_, newest)) = self.pending.as_mut() {
                    *newest = Some(value);
                }
            }
        }
        if self.exhausted {
            self.flush();
        }
        trace!(fetched, buffered = self.buffer.len(), "mvcc scan batch");
        Ok(())
    }

    fn flush(&mut self) {
        if let Some((key, Some(value))) = self.pending.take() {
            self.buffer.push_back(ScanResult { key, value });
        }
    }
}

impl<E: Engine> Iterator for MvccScan<E> {
    type Item = Result<ScanResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.buffer.pop_front() {
                return Some(Ok(result));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fill() {
                self.exhausted = true;
                self.pending = None;
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::{Error, Result},
        storage::{engine::Engine, memory::MemoryEngine},
    };

    use super::{Mvcc, MvccKey, MvccTransaction, ScanResult};

    fn scan<E: Engine>(tx: &MvccTransaction<E>, prefix: &[u8]) -> Result<Vec<ScanResult>> {
        // A tiny batch makes every scan cross several batch boundaries.
        tx.scan_prefix(prefix.to_vec(), 2).collect()
    }

    fn result(key: &[u8], value: &[u8]) -> ScanResult {
        ScanResult {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_key_encoding() -> Result<()> {
        let keys = vec![
            MvccKey::NextVersion,
            MvccKey::TxnActive(7),
            MvccKey::TxnWrite(7, b"a\x00b".to_vec()),
            MvccKey::Version(b"a\x00b".to_vec(), 9),
        ];
        for key in keys {
            assert_eq!(MvccKey::decode(&key.encode())?, key);
        }
        assert!(
            MvccKey::Version(b"a".to_vec(), u64::MAX).encode()
                < MvccKey::Version(b"a\x00".to_vec(), 0).encode()
        );
        Ok(())
    }

    #[test]
    fn test_get() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.set(b"key2".to_vec(), b"val2".to_vec())?;
        tx.set(b"key2".to_vec(), b"val3".to_vec())?;
        tx.set(b"key3".to_vec(), b"val4".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        assert_eq!(tx1.get(b"key1".to_vec())?, Some(b"val1".to_vec()));
        assert_eq!(tx1.get(b"key2".to_vec())?, Some(b"val3".to_vec()));
        assert_eq!(tx1.get(b"key3".to_vec())?, Some(b"val4".to_vec()));
        assert_eq!(tx1.get(b"key4".to_vec())?, None);

        Ok(())
    }

    #[test]
    fn test_get_isolation() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.set(b"key2".to_vec(), b"val2".to_vec())?;
        tx.set(b"key2".to_vec(), b"val3".to_vec())?;
        tx.set(b"key3".to_vec(), b"val4".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        tx1.set(b"key1".to_vec(), b"val2".to_vec())?;

        let tx2 = mvcc.begin()?;

        let tx3 = mvcc.begin()?;
        tx3.set(b"key2".to_vec(), b"val4".to_vec())?;
        tx3.set(b"key3".to_vec(), b"val4-1".to_vec())?;
        tx3.commit()?;

        assert_eq!(tx2.get(b"key1".to_vec())?, Some(b"val1".to_vec()));
        assert_eq!(tx2.get(b"key2".to_vec())?, Some(b"val3".to_vec()));
        assert_eq!(tx2.get(b"key3".to_vec())?, Some(b"val4".to_vec()));

        Ok(())
    }

    #[test]
    fn test_scan_prefix() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"aabb".to_vec(), b"val1".to_vec())?;
        tx.set(b"abcc".to_vec(), b"val2".to_vec())?;
        tx.set(b"bbaa".to_vec(), b"val3".to_vec())?;
        tx.set(b"acca".to_vec(), b"val4".to_vec())?;
        tx.set(b"aaca".to_vec(), b"val5".to_vec())?;
        tx.set(b"bcca".to_vec(), b"val6".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        assert_eq!(
            scan(&tx1, b"aa")?,
            vec![result(b"aabb", b"val1"), result(b"aaca", b"val5")]
        );
        assert_eq!(
            scan(&tx1, b"a")?,
            vec![
                result(b"aabb", b"val1"),
                result(b"aaca", b"val5"),
                result(b"abcc", b"val2"),
                result(b"acca", b"val4"),
            ]
        );
        assert_eq!(scan(&tx1, b"bcca")?, vec![result(b"bcca", b"val6")]);
        assert_eq!(scan(&tx1, b"c")?, vec![]);

        Ok(())
    }

    #[test]
    fn test_scan_many_versions() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        for i in 0..5u8 {
            let tx = mvcc.begin()?;
            tx.set(b"k1".to_vec(), vec![i])?;
            if i < 3 {
                tx.set(b"k2".to_vec(), vec![i])?;
            }
            tx.commit()?;
        }
        let tx = mvcc.begin()?;
        tx.set(b"k3".to_vec(), b"own".to_vec())?;

        assert_eq!(
            scan(&tx, b"k")?,
            vec![result(b"k1", &[4]), result(b"k2", &[2]), result(b"k3", b"own")]
        );
        Ok(())
    }

    #[test]
    fn test_scan_isolation() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"aabb".to_vec(), b"val1".to_vec())?;
        tx.set(b"abcc".to_vec(), b"val2".to_vec())?;
        tx.set(b"bbaa".to_vec(), b"val3".to_vec())?;
        tx.set(b"acca".to_vec(), b"val4".to_vec())?;
        tx.set(b"aaca".to_vec(), b"val5".to_vec())?;
        tx.set(b"bcca".to_vec(), b"val6".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        let tx2 = mvcc.begin()?;
        tx2.set(b"acca".to_vec(), b"val4-1".to_vec())?;
        tx2.set(b"aabb".to_vec(), b"val1-1".to_vec())?;

        let tx3 = mvcc.begin()?;
        tx3.set(b"bbaa".to_vec(), b"val3-1".to_vec())?;
        tx3.set(b"bcca".to_vec(), b"val6-1".to_vec())?;
        tx3.commit()?;

        assert_eq!(
            scan(&tx1, b"a")?,
            vec![
                result(b"aabb", b"val1"),
                result(b"aaca", b"val5"),
                result(b"abcc", b"val2"),
                result(b"acca", b"val4"),
            ]
        );
        assert_eq!(scan(&tx1, b"bcca")?, vec![result(b"bcca", b"val6")]);

        Ok(())
    }

    #[test]
    fn test_scan_snapshot_mid_iteration() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        for i in 0..6u8 {
            tx.set(vec![b'r', i], vec![i])?;
        }
        tx.commit()?;

        let reader = mvcc.begin()?;
        let mut iter = reader.scan_prefix(b"r".to_vec(), 2);
        assert_eq!(iter.next().transpose()?, Some(result(&[b'r', 0], &[0])));

        let writer = mvcc.begin()?;
        writer.set(vec![b'r', 1], b"changed".to_vec())?;
        writer.set(vec![b'r', 9], b"appended".to_vec())?;
        writer.set(vec![b'r', 5], b"changed".to_vec())?;
        writer.commit()?;

        let rest = iter.collect::<Result<Vec<_>>>()?;
        assert_eq!(
            rest,
            (1..6u8).map(|i| result(&[b'r', i], &[i])).collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn test_set() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.set(b"key2".to_vec(), b"val2".to_vec())?;
        tx.set(b"key3".to_vec(), b"val4".to_vec())?;
        tx.set(b"key4".to_vec(), b"val5".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        let tx2 = mvcc.begin()?;

        tx1.set(b"key1".to_vec(), b"val1-1".to_vec())?;
        tx1.set(b"key2".to_vec(), b"val3-1".to_vec())?;
        tx1.set(b"key2".to_vec(), b"val3-2".to_vec())?;

        tx2.set(b"key3".to_vec(), b"val4-1".to_vec())?;
        tx2.set(b"key4".to_vec(), b"val5-1".to_vec())?;

        tx1.commit()?;
        tx2.commit()?;

        let tx = mvcc.begin()?;
        assert_eq!(tx.get(b"key1".to_vec())?, Some(b"val1-1".to_vec()));
        assert_eq!(tx.get(b"key2".to_vec())?, Some(b"val3-2".to_vec()));
        assert_eq!(tx.get(b"key3".to_vec())?, Some(b"val4-1".to_vec()));
        assert_eq!(tx.get(b"key4".to_vec())?, Some(b"val5-1".to_vec()));
        Ok(())
    }

    #[test]
    fn test_set_conflict() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        let tx2 = mvcc.begin()?;

        tx1.set(b"key1".to_vec(), b"val1-1".to_vec())?;
        tx1.set(b"key1".to_vec(), b"val1-2".to_vec())?;

        assert_eq!(
            tx2.set(b"key1".to_vec(), b"val1-3".to_vec()),
            Err(Error::WriteConflict)
        );

        let tx3 = mvcc.begin()?;
        tx3.set(b"key5".to_vec(), b"val6".to_vec())?;
        tx3.commit()?;

        assert_eq!(
            tx1.set(b"key5".to_vec(), b"val6-1".to_vec()),
            Err(Error::WriteConflict)
        );

        tx1.commit()?;
        Ok(())
    }

    #[test]
    fn test_rollback() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let tx = mvcc.begin()?;
        tx.set(b"key1".to_vec(), b"val1".to_vec())?;
        tx.set(b"key2".to_vec(), b"val2".to_vec())?;
        tx.commit()?;

        let tx1 = mvcc.begin()?;
        tx1.set(b"key1".to_vec(), b"val1-1".to_vec())?;
        tx1.set(b"key2".to_vec(), b"val2-1".to_vec())?;
        tx1.set(b"key3".to_vec(), b"val3-1".to_vec())?;
        tx1.rollback()?;

        let tx2 = mvcc.begin()?;
        assert_eq!(tx2.get(b"key1".to_vec())?, Some(b"val1".to_vec()));
        assert_eq!(tx2.get(b"key2".to_vec())?, Some(b"val2".to_vec()));
        assert_eq!(tx2.get(b"key3".to_vec())?, None);
        assert_eq!(
            scan(&tx2, b"key")?,
            vec![result(b"key1", b"val1"), result(b"key2", b"val2")]
        );

        Ok(())
    }
}
