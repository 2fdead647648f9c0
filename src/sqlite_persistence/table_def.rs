//! Declarative SQLite table definitions.
//!
//! Tables are described as const data and turned into DDL at runtime, so
//! the same definition drives creation, idempotent drop, structural
//! validation, and the query builders in the transform layer. Key hints
//! are carried as metadata only: the warehouse does not enforce
//! uniqueness on staging or dimension keys, and the append lifecycle of
//! the target tables relies on that.

use crate::error::EtlError;
use rusqlite::Connection;

#[macro_export]
macro_rules! column_def {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when
            // optional field assignments are passed to the macro
            // (e.g., `non_null = true`)
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                non_null: false,
                is_primary_key: false,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn ddl_name(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub non_null: bool,
    pub is_primary_key: bool,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Clustering/key hint columns. Informational only, never emitted as
    /// SQL constraints.
    pub key_hint: &'static [&'static str],
}

impl Table {
    pub fn create_sql(&self) -> String {
        self.create_sql_inner(false)
    }

    /// CREATE TABLE IF NOT EXISTS variant, for tables whose contents
    /// must survive across runs.
    pub fn ensure_sql(&self) -> String {
        self.create_sql_inner(true)
    }

    fn create_sql_inner(&self, if_not_exists: bool) -> String {
        let mut sql = if if_not_exists {
            format!("CREATE TABLE IF NOT EXISTS {} (", self.name)
        } else {
            format!("CREATE TABLE {} (", self.name)
        };
        for (index, column) in self.columns.iter().enumerate() {
            if index > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(column.sql_type.ddl_name());
            if column.is_primary_key {
                sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                sql.push_str(" NOT NULL");
            }
        }
        sql.push_str(");");
        sql
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    /// INSERT statement with one positional placeholder per non-surrogate
    /// column, in declaration order.
    pub fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self.insert_columns().map(|c| c.name).collect();
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Columns that take explicit values on insert. A primary key column
    /// is a generated surrogate and is skipped.
    pub fn insert_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_primary_key)
    }

    pub fn create(&self, conn: &Connection) -> Result<(), EtlError> {
        conn.execute(&self.create_sql(), [])?;
        Ok(())
    }

    pub fn ensure(&self, conn: &Connection) -> Result<(), EtlError> {
        conn.execute(&self.ensure_sql(), [])?;
        Ok(())
    }

    pub fn drop(&self, conn: &Connection) -> Result<(), EtlError> {
        conn.execute(&self.drop_sql(), [])?;
        Ok(())
    }

    /// Check that the table exists with exactly the declared columns,
    /// types and nullability. A mismatch means DDL and code disagree,
    /// which is a configuration error, not a data error.
    pub fn validate(&self, conn: &Connection) -> Result<(), EtlError> {
        struct ActualColumn {
            name: String,
            type_name: String,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual: Vec<ActualColumn> = stmt
            .query_map([], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    type_name: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? != 0,
                    is_primary_key: row.get::<_, i32>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if actual.is_empty() {
            return Err(EtlError::MissingTable(self.name.to_string()));
        }

        if actual.len() != self.columns.len() {
            return Err(EtlError::SchemaMismatch {
                table: self.name.to_string(),
                detail: format!(
                    "has {} columns, expected {} ({})",
                    actual.len(),
                    self.columns.len(),
                    self.columns
                        .iter()
                        .map(|c| c.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        for (actual, expected) in actual.iter().zip(self.columns.iter()) {
            let mismatch = |detail: String| EtlError::SchemaMismatch {
                table: self.name.to_string(),
                detail,
            };
            if actual.name != expected.name {
                return Err(mismatch(format!(
                    "column {} found where {} was expected",
                    actual.name, expected.name
                )));
            }
            if !actual.type_name.eq_ignore_ascii_case(expected.sql_type.ddl_name()) {
                return Err(mismatch(format!(
                    "column {} has type {}, expected {}",
                    expected.name,
                    actual.type_name,
                    expected.sql_type.ddl_name()
                )));
            }
            if actual.non_null != expected.non_null {
                return Err(mismatch(format!(
                    "column {} nullability is {}, expected {}",
                    expected.name,
                    if actual.non_null { "NOT NULL" } else { "NULL" },
                    if expected.non_null { "NOT NULL" } else { "NULL" },
                )));
            }
            if actual.is_primary_key != expected.is_primary_key {
                return Err(mismatch(format!(
                    "column {} primary key flag is {}, expected {}",
                    expected.name, actual.is_primary_key, expected.is_primary_key
                )));
            }
        }

        Ok(())
    }
}
