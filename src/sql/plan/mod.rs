use std::{cell::OnceCell, collections::HashMap};

use tracing::debug;

use crate::{
    config::JoinConfig,
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::Executor,
        schema::{Schema, Table},
        types::{Record, Rows, Value},
    },
};

use self::planner::Planner;

pub mod planner;

/// A table bound to an alias within one session
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub alias: String,
    pub table: Table,
    /// The table's columns qualified by `alias`
    pub schema: Schema,
}

impl Binding {
    pub fn new(alias: impl Into<String>, table: Table) -> Self {
        let alias = alias.into();
        let schema = Schema::qualify(&alias, &table);
        Self { alias, table, schema }
    }
}

/// Positions of the equality predicate's columns in the outer and inner
/// records of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left: usize,
    pub right: usize,
}

impl JoinPredicate {
    pub fn left_value<'r>(&self, record: &'r Record) -> Result<&'r Value> {
        record
            .get(self.left)
            .ok_or_else(|| Error::Internal(format!("outer record has no column {}", self.left)))
    }

    pub fn right_value<'r>(&self, record: &'r Record) -> Result<&'r Value> {
        record
            .get(self.right)
            .ok_or_else(|| Error::Internal(format!("inner record has no column {}", self.right)))
    }

    /// Compares the predicate columns; values of different variants are a
    /// `TypeMismatch`, never a non-match.
    pub fn matches(&self, left: &Record, right: &Record) -> Result<bool> {
        self.left_value(left)?.matches(self.right_value(right)?)
    }
}

/// Operator tree node
///
/// Every node carries its output schema; nodes own their children.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scan {
        alias: String,
        table: Table,
        schema: Schema,
    },
    Join {
        left: Box<Node>,
        right: Box<Node>,
        predicate: JoinPredicate,
        join: JoinConfig,
        schema: Schema,
    },
    Projection {
        source: Box<Node>,
        columns: Vec<usize>,
        schema: Schema,
    },
}

impl Node {
    pub fn schema(&self) -> &Schema {
        match self {
            Node::Scan { schema, .. }
            | Node::Join { schema, .. }
            | Node::Projection { schema, .. } => schema,
        }
    }
}

/// A query over the aliases bound in one session
///
/// Built from a base alias, extended with `join` and narrowed with
/// `select`. `execute` may be called any number of times; each call
/// re-runs the whole operator tree and returns an independent iterator.
/// Once executed, or once projected, the plan's shape is fixed and further
/// `join`/`select` calls fail with `Error::PlanFinalized`.
pub struct QueryPlan<'a, T: Transaction + 'static> {
    txn: &'a T,
    bindings: &'a HashMap<String, Binding>,
    planner: Planner,
    root: Node,
    projected: bool,
    executor: OnceCell<Box<dyn Executor<T>>>,
}

impl<'a, T: Transaction + 'static> QueryPlan<'a, T> {
    pub(crate) fn new(
        txn: &'a T,
        bindings: &'a HashMap<String, Binding>,
        join: JoinConfig,
        alias: &str,
    ) -> Result<Self> {
        let planner = Planner::new(join);
        let root = planner.scan(Self::binding(bindings, alias)?);
        debug!(alias, "plan scan");
        Ok(Self {
            txn,
            bindings,
            planner,
            root,
            projected: false,
            executor: OnceCell::new(),
        })
    }

    fn binding(bindings: &'a HashMap<String, Binding>, alias: &str) -> Result<&'a Binding> {
        bindings
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.projected || self.is_executed() {
            return Err(Error::PlanFinalized);
        }
        Ok(())
    }

    /// Joins `alias` on `left_col = right_col`, where `left_col` names a
    /// column already in the plan and `right_col` a column of `alias`.
    pub fn join(&mut self, alias: &str, left_col: &str, right_col: &str) -> Result<&mut Self> {
        self.ensure_open()?;
        let binding = Self::binding(self.bindings, alias)?;
        self.root = self.planner.join(&self.root, binding, left_col, right_col)?;
        Ok(self)
    }

    /// Restricts the output to `columns`, in order; duplicates are kept.
    pub fn select<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<&mut Self> {
        self.ensure_open()?;
        self.root = self.planner.project(&self.root, columns)?;
        self.projected = true;
        Ok(self)
    }

    /// Returns a lazy iterator over the plan's output records
    pub fn execute(&self) -> Result<Rows<'_>> {
        let executor = self
            .executor
            .get_or_init(|| <dyn Executor<T>>::build(self.root.clone()));
        debug!(columns = ?self.root.schema().column_names(), "execute query plan");
        executor.execute(self.txn)
    }

    pub fn is_executed(&self) -> bool {
        self.executor.get().is_some()
    }

    /// Output schema of the plan
    pub fn schema(&self) -> &Schema {
        self.root.schema()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.root.schema().column_names()
    }
}
