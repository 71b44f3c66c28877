use crate::{
    config::JoinStrategy,
    error::Result,
    sql::{
        engine::Transaction,
        executor::{
            join::{BlockNestedLoopJoin, HashJoin, NestedLoopJoin},
            query::{Projection, Scan},
        },
        plan::Node,
        types::{Record, Rows},
    },
};

mod join;
mod query;

/// Query executor trait
///
/// Executors are built once per plan and may be executed any number of
/// times; every call opens fresh scans and returns an independent lazy
/// iterator borrowing the executor and the transaction.
pub trait Executor<T: Transaction> {
    fn execute<'a>(&'a self, txn: &'a T) -> Result<Rows<'a>>;
}

/// Builds an executor from a plan node
///
/// The `'static` bound is required for trait object usage in recursive executor building.
impl<T: Transaction + 'static> dyn Executor<T> {
    pub fn build(node: Node) -> Box<dyn Executor<T>> {
        match node {
            Node::Scan { table, .. } => Scan::new(table),
            Node::Join {
                left,
                right,
                predicate,
                join,
                ..
            } => {
                let (left, right) = (Self::build(*left), Self::build(*right));
                match join.strategy {
                    JoinStrategy::NestedLoop => NestedLoopJoin::new(left, right, predicate),
                    JoinStrategy::BlockNestedLoop => {
                        BlockNestedLoopJoin::new(left, right, predicate, join.block_size)
                    }
                    JoinStrategy::Hash => HashJoin::new(left, right, predicate),
                }
            }
            Node::Projection {
                source, columns, ..
            } => Projection::new(Self::build(*source), columns),
        }
    }
}

/// Pull-based record producer behind an operator's iterator
pub(crate) trait RowSource {
    fn try_next(&mut self) -> Result<Option<Record>>;
}

/// Adapts a `RowSource` into an iterator that ends for good after the
/// source is exhausted or fails, releasing the source's scans right away.
pub(crate) struct RowIter<S> {
    state: Option<S>,
}

impl<S: RowSource> RowIter<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            state: Some(source),
        }
    }
}

impl<S: RowSource> Iterator for RowIter<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.as_mut()?;
        match state.try_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.state = None;
                None
            }
            Err(err) => {
                self.state = None;
                Some(Err(err))
            }
        }
    }
}
