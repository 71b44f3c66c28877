use crate::{
    error::Result,
    sql::{engine::Transaction, schema::Table, types::Rows},
};

use super::Executor;

/// Full table scan executor, in storage order
pub struct Scan {
    table: Table,
}

impl Scan {
    pub fn new(table: Table) -> Box<Self> {
        Box::new(Self { table })
    }
}

impl<T: Transaction> Executor<T> for Scan {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>> {
        txn.scan_table(&self.table)
    }
}

/// Projection executor - narrows every record to the resolved column positions
pub struct Projection<T: Transaction> {
    source: Box<dyn Executor<T>>,
    columns: Vec<usize>,
}

impl<T: Transaction> Projection<T> {
    pub fn new(source: Box<dyn Executor<T>>, columns: Vec<usize>) -> Box<Self> {
        Box::new(Self { source, columns })
    }
}

impl<T: Transaction> Executor<T> for Projection<T> {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>> {
        let columns = &self.columns;
        let rows = self.source.execute(txn)?;
        Ok(Box::new(rows.map(move |record| record.map(|r| r.project(columns)))))
    }
}
