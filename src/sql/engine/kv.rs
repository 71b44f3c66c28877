use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tracing::{debug, trace};

use crate::{
    config::Config,
    error::{Error, Result},
    sql::{
        schema::Table,
        types::{DataType, Record, Rows},
    },
    storage::{
        self,
        engine::Engine as StorageEngine,
        keycode,
        mvcc::{MvccScan, Version},
    },
};

use super::{Engine, Transaction};

/// Key-value store backed SQL engine
pub struct KVEngine<E: StorageEngine> {
    pub kv: storage::mvcc::Mvcc<E>,
    config: Config,
}

impl<E: StorageEngine> Clone for KVEngine<E> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E: StorageEngine> KVEngine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            kv: storage::mvcc::Mvcc::new(engine),
            config: Config::default(),
        }
    }

    pub fn with_config(engine: E, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kv: storage::mvcc::Mvcc::new(engine),
            config,
        })
    }
}

impl<E: StorageEngine + 'static> Engine for KVEngine<E> {
    type Transaction = KVTransaction<E>;

    fn begin(&self) -> Result<Self::Transaction> {
        Ok(Self::Transaction::new(
            self.kv.begin()?,
            self.config.scan_batch_size,
        ))
    }

    fn config(&self) -> &Config {
        &self.config
    }
}

/// Key-value transaction (wrapper around MVCC transaction)
pub struct KVTransaction<E: StorageEngine> {
    txn: storage::mvcc::MvccTransaction<E>,
    batch_size: usize,
    open_scans: Arc<AtomicUsize>,
}

impl<E: StorageEngine> KVTransaction<E> {
    pub fn new(txn: storage::mvcc::MvccTransaction<E>, batch_size: usize) -> Self {
        Self {
            txn,
            batch_size,
            open_scans: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allocates the next row id of a table; ids start at 0 and only grow,
    /// so row keys sort in append order.
    fn next_row_id(&self, table_name: &str) -> Result<u64> {
        let key = Key::RowId(table_name).encode();
        let id = match self.txn.get(key.clone())? {
            Some(value) => bincode::deserialize(&value)?,
            None => 0,
        };
        self.txn.set(key, bincode::serialize(&(id + 1))?)?;
        Ok(id)
    }
}

impl<E: StorageEngine> Transaction for KVTransaction<E> {
    fn version(&self) -> Version {
        self.txn.version()
    }

    fn commit(&self) -> Result<()> {
        self.txn.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.txn.rollback()
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        if table.name.is_empty() {
            return Err(Error::SchemaMismatch("table name is empty".into()));
        }
        // Check if table already exists
        if self.get_table(&table.name)?.is_some() {
            return Err(Error::TableExists(table.name));
        }
        table.validate()?;

        // Store table schema: key = table name, value = serialized table schema
        let key = Key::Table(&table.name).encode();
        self.txn.set(key, bincode::serialize(&table)?)?;
        debug!(table = %table.name, columns = table.columns.len(), "create table");
        Ok(())
    }

    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let key = Key::Table(table_name).encode();
        Ok(self
            .txn
            .get(key)?
            .map(|v| bincode::deserialize(&v))
            .transpose()?)
    }

    fn append_record(&mut self, table: &Table, record: Record) -> Result<()> {
        table.check_values(&record.values)?;

        let id = self.next_row_id(&table.name)?;
        let key = Key::Row(&table.name, id).encode();
        self.txn.set(key, record.encode())?;
        trace!(table = %table.name, id, "append record");
        Ok(())
    }

    fn scan_table<'a>(&'a self, table: &Table) -> Result<Rows<'a>> {
        let prefix = KeyPrefix::Row(&table.name).encode();
        let scan = self.txn.scan_prefix(prefix, self.batch_size);
        let guard = ScanGuard::open(self.open_scans.clone(), &table.name);
        Ok(Box::new(TableScan {
            inner: Some((scan, guard)),
            datatypes: table.datatypes(),
        }))
    }

    fn open_scans(&self) -> usize {
        self.open_scans.load(Ordering::SeqCst)
    }
}

/// Decodes the stored records of one table as they stream out of the MVCC
/// scan. The scan and its guard are dropped as soon as the scan ends or
/// fails.
struct TableScan<E: StorageEngine> {
    inner: Option<(MvccScan<E>, ScanGuard)>,
    datatypes: Vec<DataType>,
}

impl<E: StorageEngine> Iterator for TableScan<E> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let (scan, _) = self.inner.as_mut()?;
        let result = match scan.next() {
            Some(Ok(result)) => Record::decode(&self.datatypes, &result.value),
            Some(Err(err)) => Err(err),
            None => {
                self.inner = None;
                return None;
            }
        };
        if result.is_err() {
            self.inner = None;
        }
        Some(result)
    }
}

/// Counts a scan as open for as long as it lives
struct ScanGuard {
    counter: Arc<AtomicUsize>,
    table: String,
}

impl ScanGuard {
    fn open(counter: Arc<AtomicUsize>, table: &str) -> Self {
        let open = counter.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(table, open, "open table scan");
        Self {
            counter,
            table: table.to_string(),
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let open = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        trace!(table = %self.table, open, "release table scan");
    }
}

/// Key types for KV storage operations
///
/// Tags keep catalog entries, row id counters and rows in separate key
/// ranges; table names are escaped so no table's rows share a prefix with
/// another's.
#[derive(Debug)]
enum Key<'a> {
    Table(&'a str),
    RowId(&'a str),
    Row(&'a str, u64),
}

impl Key<'_> {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Key::Table(name) => {
                out.push(0x00);
                keycode::encode_bytes(&mut out, name.as_bytes());
            }
            Key::RowId(name) => {
                out.push(0x01);
                keycode::encode_bytes(&mut out, name.as_bytes());
            }
            Key::Row(name, id) => {
                out.push(0x02);
                keycode::encode_bytes(&mut out, name.as_bytes());
                keycode::encode_u64(&mut out, *id);
            }
        }
        out
    }
}

/// Key prefix types for prefix scanning
#[derive(Debug)]
enum KeyPrefix<'a> {
    Row(&'a str),
}

impl KeyPrefix<'_> {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            KeyPrefix::Row(name) => {
                out.push(0x02);
                keycode::encode_bytes(&mut out, name.as_bytes());
            }
        }
        out
    }
}
