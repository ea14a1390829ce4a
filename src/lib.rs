//! Async reader and appender for dBase (`.dbf`) tables.
//!
//! ```no_run
//! use adbf_table::{FieldDescriptor, Options, Record, Table};
//! use futures::TryStreamExt;
//!
//! # async fn demo() -> adbf_table::Result<()> {
//! let fields = vec![
//!     FieldDescriptor::numeric("ID", 5, 0),
//!     FieldDescriptor::character("NAME", 30),
//!     FieldDescriptor::logical("ACTIVE"),
//! ];
//! let mut table = Table::create("people.dbf", fields, &Options::default()).await?;
//! table.append_many(&[Record::new().with("ID", 1).with("NAME", "Alice").with("ACTIVE", true)]).await?;
//!
//! table.rewind();
//! let rows: Vec<_> = table.scan().try_collect().await?;
//! # Ok(())
//! # }
//! ```
use encoding_rs::Encoding;

#[cfg(test)]
mod tests;

pub mod error;
pub mod field;
pub mod header;
pub mod options;
pub mod table;

pub use error::{DbfError, Result};
pub use field::{FieldDescriptor, FieldType, Record, RecordEntry, Value};
pub use header::{Header, Version};
pub use options::{EncodingConfig, Options, Policy, ReadMode, Tolerance};
pub use table::Table;

fn get_encoding(label: &str) -> Result<&'static Encoding> {
    match Encoding::for_label(label.as_bytes()) {
        Some(e) => Ok(e),
        None => Err(DbfError::InvalidConfiguration(format!("Fail to find encoding for codepage {}", label)))
    }
}
