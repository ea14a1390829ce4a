//! Error type shared by every table operation.

use std::path::PathBuf;

use thiserror::Error;

/// Table operation errors.
#[derive(Error, Debug)]
pub enum DbfError {
    /// Version byte outside the supported set
    #[error("Unsupported file version 0x{version:02x}")]
    FormatVersionUnsupported { version: u8 },

    /// Field descriptor rejected at create time
    #[error("Invalid field descriptor '{field}': {reason}")]
    DescriptorInvalid { field: String, reason: String },

    /// Header or descriptor table that cannot be parsed
    #[error("Malformed header: {0}")]
    DescriptorMalformed(String),

    /// Memo versions need a `.dbt` file next to the table
    #[error("Memo file for '{}' not found", .table.display())]
    MissingSideFile { table: PathBuf },

    /// Read or write of a type tag the codec cannot handle
    #[error("Field '{field}' has unsupported type '{tag}'")]
    UnsupportedFieldType { field: String, tag: char },

    /// Appended value does not fit its field
    #[error("Record {record}: field '{field}' expects {expected}, got {found}")]
    RecordValidationFailed {
        record: usize,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Options rejected before any I/O
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Underlying storage failure
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl DbfError {
    /// Wraps an I/O error with the operation it interrupted.
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> DbfError {
        move |source| DbfError::Io { context, source }
    }
}

pub type Result<T> = std::result::Result<T, DbfError>;
