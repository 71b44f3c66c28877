use tracing::debug;

use crate::{
    config::JoinConfig,
    error::{Error, Result},
    sql::plan::{Binding, JoinPredicate, Node},
};

/// Query planner - turns alias bindings and column references into
/// resolved plan nodes
///
/// All name resolution happens here, so a plan that builds successfully
/// never fails on a missing alias or column while executing.
pub struct Planner {
    join: JoinConfig,
}

impl Planner {
    pub fn new(join: JoinConfig) -> Self {
        Self { join }
    }

    /// Full scan of a bound table
    pub fn scan(&self, binding: &Binding) -> Node {
        Node::Scan {
            alias: binding.alias.clone(),
            table: binding.table.clone(),
            schema: binding.schema.clone(),
        }
    }

    /// Wraps `left` in an equality join with a fresh scan of `right`.
    ///
    /// `left_col` resolves against the schema built so far, `right_col`
    /// against the joined alias alone.
    pub fn join(
        &self,
        left: &Node,
        right: &Binding,
        left_col: &str,
        right_col: &str,
    ) -> Result<Node> {
        if left.schema().has_alias(&right.alias) {
            return Err(Error::DuplicateAlias(right.alias.clone()));
        }
        let (left_pos, _) = left.schema().resolve(left_col)?;
        let right = self.scan(right);
        let (right_pos, _) = right.schema().resolve(right_col)?;

        debug!(left_col, right_col, strategy = ?self.join.strategy, "plan join");
        let schema = left.schema().join(right.schema());
        Ok(Node::Join {
            left: Box::new(left.clone()),
            right: Box::new(right),
            predicate: JoinPredicate {
                left: left_pos,
                right: right_pos,
            },
            join: self.join,
            schema,
        })
    }

    /// Wraps `source` in a projection onto `columns`
    pub fn project<S: AsRef<str>>(&self, source: &Node, columns: &[S]) -> Result<Node> {
        let (schema, positions) = source.schema().project(columns)?;
        debug!(columns = ?schema.column_names(), "plan projection");
        Ok(Node::Projection {
            source: Box::new(source.clone()),
            columns: positions,
            schema,
        })
    }
}
