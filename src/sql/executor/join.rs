use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        plan::JoinPredicate,
        types::{DataType, Record, Rows, Value},
    },
};

use super::{Executor, RowIter, RowSource};

/// Nested Loop Join executor - rescans the inner side for every outer record
pub struct NestedLoopJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    predicate: JoinPredicate,
}

impl<T: Transaction> NestedLoopJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        predicate: JoinPredicate,
    ) -> Box<Self> {
        Box::new(Self {
            left,
            right,
            predicate,
        })
    }
}

impl<T: Transaction> Executor<T> for NestedLoopJoin<T> {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>> {
        let outer = self.left.execute(txn)?;
        Ok(Box::new(RowIter::new(NestedLoopRows {
            right: self.right.as_ref(),
            txn,
            predicate: self.predicate,
            outer,
            current: None,
        })))
    }
}

struct NestedLoopRows<'a, T: Transaction> {
    right: &'a dyn Executor<T>,
    txn: &'a T,
    predicate: JoinPredicate,
    outer: Rows<'a>,
    /// Current outer record and its inner rescan
    current: Option<(Record, Rows<'a>)>,
}

impl<T: Transaction> RowSource for NestedLoopRows<'_, T> {
    fn try_next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some((outer, inner)) = &mut self.current {
                while let Some(record) = inner.next().transpose()? {
                    if self.predicate.matches(outer, &record)? {
                        return Ok(Some(outer.concat(&record)));
                    }
                }
                self.current = None;
            }
            match self.outer.next().transpose()? {
                Some(record) => {
                    let inner = self.right.execute(self.txn)?;
                    self.current = Some((record, inner));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Block Nested Loop Join executor - buffers `block_size` outer records and
/// rescans the inner side once per block
pub struct BlockNestedLoopJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    predicate: JoinPredicate,
    block_size: usize,
}

impl<T: Transaction> BlockNestedLoopJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        predicate: JoinPredicate,
        block_size: usize,
    ) -> Box<Self> {
        Box::new(Self {
            left,
            right,
            predicate,
            block_size: block_size.max(1),
        })
    }
}

impl<T: Transaction> Executor<T> for BlockNestedLoopJoin<T> {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>> {
        let outer = self.left.execute(txn)?;
        Ok(Box::new(RowIter::new(BlockRows {
            right: self.right.as_ref(),
            txn,
            predicate: self.predicate,
            block_size: self.block_size,
            outer,
            outer_done: false,
            output: VecDeque::new(),
        })))
    }
}

struct BlockRows<'a, T: Transaction> {
    right: &'a dyn Executor<T>,
    txn: &'a T,
    predicate: JoinPredicate,
    block_size: usize,
    outer: Rows<'a>,
    outer_done: bool,
    /// Joined records of the current block, outer-major
    output: VecDeque<Record>,
}

impl<T: Transaction> BlockRows<'_, T> {
    fn next_block(&mut self) -> Result<Vec<Record>> {
        let mut block = Vec::with_capacity(self.block_size);
        while !self.outer_done && block.len() < self.block_size {
            match self.outer.next().transpose()? {
                Some(record) => block.push(record),
                None => self.outer_done = true,
            }
        }
        Ok(block)
    }
}

impl<T: Transaction> RowSource for BlockRows<'_, T> {
    fn try_next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.output.pop_front() {
                return Ok(Some(record));
            }
            let block = self.next_block()?;
            if block.is_empty() {
                return Ok(None);
            }

            // Matches are collected per outer record so that output stays
            // grouped by outer record even though the inner side drives.
            let mut matches = vec![Vec::<Record>::new(); block.len()];
            for inner in self.right.execute(self.txn)? {
                let inner = inner?;
                for (outer, found) in block.iter().zip(matches.iter_mut()) {
                    if self.predicate.matches(outer, &inner)? {
                        found.push(outer.concat(&inner));
                    }
                }
            }
            trace!(outer = block.len(), "block nested loop pass");
            self.output.extend(matches.into_iter().flatten());
        }
    }
}

/// Hash Join executor - scans the inner side once into a hash table keyed
/// on the join column, then looks up every outer record in it
pub struct HashJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    predicate: JoinPredicate,
}

impl<T: Transaction> HashJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        predicate: JoinPredicate,
    ) -> Box<Self> {
        Box::new(Self {
            left,
            right,
            predicate,
        })
    }
}

impl<T: Transaction> Executor<T> for HashJoin<T> {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>> {
        let outer = self.left.execute(txn)?;
        Ok(Box::new(RowIter::new(HashRows {
            right: self.right.as_ref(),
            txn,
            predicate: self.predicate,
            outer,
            table: None,
            pending: VecDeque::new(),
        })))
    }
}

/// Hashable form of a join column value
///
/// Floats key on their bit pattern, which is exactly the equality
/// `Value::compare` uses.
#[derive(Debug, PartialEq, Eq, Hash)]
enum HashKey {
    Integer(i32),
    Float(u32),
    String(String),
}

impl From<&Value> for HashKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Integer(v) => HashKey::Integer(*v),
            Value::Float(v) => HashKey::Float(v.to_bits()),
            Value::String(v, _) => HashKey::String(v.clone()),
        }
    }
}

struct HashTable {
    /// Type of the inner join column, unknown while the inner side is empty
    inner_type: Option<DataType>,
    buckets: HashMap<HashKey, Vec<Record>>,
}

struct HashRows<'a, T: Transaction> {
    right: &'a dyn Executor<T>,
    txn: &'a T,
    predicate: JoinPredicate,
    outer: Rows<'a>,
    /// Built on the first outer record, so an empty outer side never
    /// scans the inner one
    table: Option<HashTable>,
    pending: VecDeque<Record>,
}

impl<T: Transaction> HashRows<'_, T> {
    fn build(&self) -> Result<HashTable> {
        let mut inner_type = None;
        let mut buckets: HashMap<HashKey, Vec<Record>> = HashMap::new();
        let mut count = 0;
        for record in self.right.execute(self.txn)? {
            let record = record?;
            let value = self.predicate.right_value(&record)?;
            inner_type.get_or_insert(value.datatype());
            buckets.entry(HashKey::from(value)).or_default().push(record);
            count += 1;
        }
        debug!(records = count, keys = buckets.len(), "hash join build");
        Ok(HashTable {
            inner_type,
            buckets,
        })
    }
}

impl<T: Transaction> RowSource for HashRows<'_, T> {
    fn try_next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            let Some(outer) = self.outer.next().transpose()? else {
                return Ok(None);
            };
            if self.table.is_none() {
                let table = self.build()?;
                self.table = Some(table);
            }
            let Some(table) = self.table.as_ref() else {
                return Ok(None);
            };

            let value = self.predicate.left_value(&outer)?;
            if let Some(inner_type) = table.inner_type {
                if !value.datatype().same_variant(&inner_type) {
                    return Err(Error::TypeMismatch {
                        left: value.datatype(),
                        right: inner_type,
                    });
                }
            }
            if let Some(matches) = table.buckets.get(&HashKey::from(value)) {
                self.pending
                    .extend(matches.iter().map(|inner| outer.concat(inner)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HashKey;
    use crate::sql::types::Value;

    #[test]
    fn test_hash_key_equality() {
        // Same equality as Value::matches
        let pairs = [
            (Value::Float(f32::NAN), Value::Float(f32::NAN)),
            (Value::Float(1.5), Value::Float(1.5)),
            (Value::string("ab", 20), Value::string("ab", 4)),
            (Value::Integer(-3), Value::Integer(-3)),
        ];
        for (a, b) in pairs {
            assert_eq!(HashKey::from(&a), HashKey::from(&b));
        }
        assert_ne!(HashKey::from(&Value::Float(0.0)), HashKey::from(&Value::Float(-0.0)));
        assert_ne!(HashKey::from(&Value::Integer(1)), HashKey::from(&Value::Float(1.0)));
    }
}
