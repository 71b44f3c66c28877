use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    config::{Config, JoinConfig},
    error::{Error, Result},
    sql::{
        plan::{Binding, QueryPlan},
        schema::{Column, Table},
        types::{Record, Rows, Value},
    },
};

mod kv;

pub use kv::{KVEngine, KVTransaction};

/// SQL engine trait
pub trait Engine: Clone {
    type Transaction: Transaction + 'static;

    fn begin(&self) -> Result<Self::Transaction>;

    fn config(&self) -> &Config;

    fn session(&self) -> Result<Session<Self>> {
        Session::begin(self)
    }
}

/// SQL transaction trait (catalog, record storage and scans)
///
/// Can be backed by KV storage or distributed storage.
/// Each SQL engine can have its own transaction type (e.g., 2PL, OCC).
pub trait Transaction {
    fn version(&self) -> u64;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    // DDL operations
    fn create_table(&mut self, table: Table) -> Result<()>;
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;
    /// Returns table info, returns error if table doesn't exist
    fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?
            .ok_or_else(|| Error::UnknownTable(table_name.to_string()))
    }

    /// Appends a record after the table's existing records
    fn append_record(&mut self, table: &Table, record: Record) -> Result<()>;
    /// Lazily scans every record of `table` in append order
    fn scan_table<'a>(&'a self, table: &Table) -> Result<Rows<'a>>;
    /// Scans opened by this transaction that have not been exhausted,
    /// failed, or dropped yet
    fn open_scans(&self) -> usize;
}

/// A transaction together with its alias bindings
///
/// `end` commits, `rollback` discards. A session dropped without either is
/// rolled back. Plans borrow the session, so the session cannot end while
/// a plan or one of its iterators is alive.
pub struct Session<E: Engine> {
    txn: E::Transaction,
    join: JoinConfig,
    bindings: HashMap<String, Binding>,
    finished: bool,
}

impl<E: Engine> Session<E> {
    pub fn begin(engine: &E) -> Result<Self> {
        let txn = engine.begin()?;
        debug!(version = txn.version(), "begin session");
        Ok(Self {
            txn,
            join: engine.config().join,
            bindings: HashMap::new(),
            finished: false,
        })
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        self.txn.create_table(Table::new(name, columns))
    }

    pub fn table(&self, name: &str) -> Result<Table> {
        self.txn.must_get_table(name)
    }

    pub fn add_record(&mut self, table_name: &str, values: Vec<Value>) -> Result<()> {
        let table = self.txn.must_get_table(table_name)?;
        self.txn.append_record(&table, Record::new(values))
    }

    /// Binds `alias` to `table_name` for the rest of the session
    pub fn query_as(&mut self, table_name: &str, alias: &str) -> Result<()> {
        if alias.is_empty() || alias.contains('.') {
            return Err(Error::InvalidAlias(alias.to_string()));
        }
        let table = self.txn.must_get_table(table_name)?;
        if self.bindings.contains_key(alias) {
            return Err(Error::DuplicateAlias(alias.to_string()));
        }
        debug!(table = table_name, alias, "bind alias");
        self.bindings
            .insert(alias.to_string(), Binding::new(alias, table));
        Ok(())
    }

    /// Starts a query plan scanning the table bound to `alias`
    pub fn query(&self, alias: &str) -> Result<QueryPlan<'_, E::Transaction>> {
        QueryPlan::new(&self.txn, &self.bindings, self.join, alias)
    }

    /// Lazily scans a table directly, without an alias
    pub fn scan(&self, table_name: &str) -> Result<Rows<'_>> {
        let table = self.txn.must_get_table(table_name)?;
        self.txn.scan_table(&table)
    }

    pub fn open_scans(&self) -> usize {
        self.txn.open_scans()
    }

    /// Commits the transaction
    pub fn end(mut self) -> Result<()> {
        self.finished = true;
        debug!(version = self.txn.version(), "commit session");
        self.txn.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        debug!(version = self.txn.version(), "rollback session");
        self.txn.rollback()
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.txn.rollback() {
            warn!(version = self.txn.version(), %err, "rollback on drop failed");
        }
    }
}
