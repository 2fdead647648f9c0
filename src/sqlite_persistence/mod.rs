mod table_def;

pub use table_def::{Column, SqlType, Table};
