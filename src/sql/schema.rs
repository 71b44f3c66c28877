use std::{collections::HashSet, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::types::{DataType, Record, Value},
};

/// Table definition as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::SchemaMismatch(format!(
                "table {} has no columns",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for col in &self.columns {
            if col.name.is_empty() || col.name.contains('.') {
                return Err(Error::SchemaMismatch(format!(
                    "invalid column name {:?} in table {}",
                    col.name, self.name
                )));
            }
            if !names.insert(col.name.as_str()) {
                return Err(Error::SchemaMismatch(format!(
                    "duplicate column {} in table {}",
                    col.name, self.name
                )));
            }
            if col.datatype == DataType::String(0) {
                return Err(Error::SchemaMismatch(format!(
                    "column {} has zero width",
                    col.name
                )));
            }
        }
        Ok(())
    }

    pub fn datatypes(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.datatype).collect()
    }

    /// Checks that `values` has one value per column, each of the column's
    /// variant and, for strings, declared width.
    pub fn check_values(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "table {} expects {} values, got {}",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        for (col, value) in self.columns.iter().zip(values) {
            if value.datatype() != col.datatype {
                return Err(Error::SchemaMismatch(format!(
                    "column {} is {}, got {}",
                    col.name,
                    col.datatype,
                    value.datatype()
                )));
            }
            if let Value::String(text, len) = value {
                if text.len() > *len {
                    return Err(Error::SchemaMismatch(format!(
                        "value for column {} exceeds {} bytes",
                        col.name, len
                    )));
                }
                // NUL is the padding byte of the fixed-width encoding
                if text.contains('\0') {
                    return Err(Error::SchemaMismatch(format!(
                        "value for column {} contains a NUL byte",
                        col.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

/// A column of a plan's schema, qualified by the alias it was read through
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: String,
    pub name: String,
    pub datatype: DataType,
}

impl Field {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.alias, self.name)
    }

    fn matches(&self, alias: &str, name: &str) -> bool {
        self.alias == alias && self.name == name
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.alias, self.name, self.datatype)
    }
}

/// Ordered, immutable list of alias-qualified columns
///
/// Scans qualify a table's columns with their alias, joins concatenate the
/// outer and inner schemas, projections pick columns out of their input.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Qualifies every column of `table` with `alias`
    pub fn qualify(alias: &str, table: &Table) -> Self {
        Self {
            fields: table
                .columns
                .iter()
                .map(|c| Field {
                    alias: alias.to_string(),
                    name: c.name.clone(),
                    datatype: c.datatype,
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(Field::qualified_name).collect()
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.fields.iter().any(|f| f.alias == alias)
    }

    /// Resolves `alias.column` to its position and type
    pub fn resolve(&self, qualified_name: &str) -> Result<(usize, DataType)> {
        let (alias, name) = qualified_name
            .split_once('.')
            .ok_or_else(|| Error::UnknownColumn(qualified_name.to_string()))?;
        self.fields
            .iter()
            .position(|f| f.matches(alias, name))
            .map(|i| (i, self.fields[i].datatype))
            .ok_or_else(|| Error::UnknownColumn(qualified_name.to_string()))
    }

    /// Outer columns followed by inner columns
    pub fn join(&self, inner: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(inner.fields.iter().cloned());
        Schema { fields }
    }

    /// Narrows to `columns`, in the given order, returning the new schema and
    /// the input position of every output column.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Result<(Schema, Vec<usize>)> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut positions = Vec::with_capacity(columns.len());
        for column in columns {
            let (i, _) = self.resolve(column.as_ref())?;
            fields.push(self.fields[i].clone());
            positions.push(i);
        }
        Ok((Schema { fields }, positions))
    }

    /// True when `record` has one value per field with matching types
    pub fn conforms(&self, record: &Record) -> bool {
        record.len() == self.len()
            && self
                .fields
                .iter()
                .zip(&record.values)
                .all(|(f, v)| v.datatype() == f.datatype)
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self.fields.iter().map(|f| f.to_string()).collect::<Vec<_>>();
        write!(f, "[{}]", fields.join(", "))
    }
}
