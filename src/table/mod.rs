//! The open table handle.
//!
//! A [Table] caches the parsed header plus a read cursor. Every operation
//! opens the file, does its I/O and closes it again, so nothing holds a
//! descriptor between calls. Nothing coordinates writers either: two
//! handles appending to the same file will corrupt it.

use chrono::naive::NaiveDate;
use chrono::Local;
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;

use crate::error::{DbfError, Result};
use crate::field::FieldDescriptor;
use crate::header::{self, Header, Version, EOF_MARKER, HEADER_PREFIX_LEN};
use crate::get_encoding;
use crate::options::{codepage_label, language_driver, EncodingResolver, Options, Policy, Tolerance};

mod append;
mod read;


/// Records fetched per read while scanning.
pub const SCAN_BATCH: u32 = 100;

const MEMO_EXTENSIONS: [&str; 2] = ["dbt", "DBT"];
const MEMO_BLOCK_LEN: usize = 512;

pub struct Table {
    pub meta: Header,
    path: PathBuf,
    memo_path: Option<PathBuf>,
    encodings: EncodingResolver,
    tolerance: Tolerance,
    include_deleted: bool,
    cursor: u32
}

impl Table {
    /// Opens an existing table and parses its header.
    ///
    /// Fails with [DbfError::FormatVersionUnsupported] or
    /// [DbfError::MissingSideFile] unless the options tolerate structural
    /// problems.
    pub async fn open(path: impl AsRef<Path>, options: &Options) -> Result<Table> {
        let path = path.as_ref().to_path_buf();
        let encodings = EncodingResolver::new(options.encoding.as_ref())?;
        let structure = options.tolerance.structure;

        let mut file = File::open(&path).await.map_err(DbfError::io("opening table"))?;
        let mut bytes = vec![0u8; HEADER_PREFIX_LEN];
        read_fully(&mut file, &mut bytes).await?;
        let header_len = Header::peek_len(&bytes)?;
        if header_len > HEADER_PREFIX_LEN {
            bytes.resize(header_len, 0);
            read_fully(&mut file, &mut bytes[HEADER_PREFIX_LEN..]).await?;
        }
        drop(file);

        let meta = Header::parse(&bytes, structure)?;

        if !meta.version.is_supported() {
            match structure {
                Policy::Reject => {
                    return Err(DbfError::FormatVersionUnsupported { version: meta.version.flag() })
                },
                Policy::Tolerate => {
                    tracing::warn!(path = %path.display(), version = meta.version.flag(), "unsupported version tolerated")
                }
            }
        }

        let memo_path = if meta.version.requires_memo_file() {
            let found = find_memo_file(&path).await;
            if found.is_none() {
                match structure {
                    Policy::Reject => return Err(DbfError::MissingSideFile { table: path }),
                    Policy::Tolerate => tracing::warn!(path = %path.display(), "memo file missing")
                }
            }
            found
        } else {
            None
        };

        let encodings = match codepage_label(meta.language_driver) {
            Some(label) => encodings.with_fallback(get_encoding(label)?),
            None => encodings
        };

        tracing::debug!(
            path = %path.display(),
            version = meta.version.flag(),
            records = meta.records_count,
            fields = meta.fields.len(),
            "opened table"
        );

        Ok(Table {
            meta,
            path,
            memo_path,
            encodings,
            tolerance: options.tolerance,
            include_deleted: options.include_deleted_records,
            cursor: 0
        })
    }

    /// Writes a new, empty table at `path` and opens it.
    ///
    /// The version must be supported even when the options are loose. A
    /// configured charset with a known language driver id is recorded in
    /// the header.
    ///
    /// The returned handle comes from parsing the bytes just written, so a
    /// layout the reader cannot understand surfaces here rather than on a
    /// later open.
    pub async fn create(path: impl AsRef<Path>, fields: Vec<FieldDescriptor>, options: &Options) -> Result<Table> {
        let path = path.as_ref();
        let version = options.file_version;
        if !version.is_supported() {
            return Err(DbfError::FormatVersionUnsupported { version: version.flag() })
        }
        let encodings = EncodingResolver::new(options.encoding.as_ref())?;
        header::validate_fields(&fields, version)?;

        let mut meta = Header::new(version, fields, today());
        if let Some(driver) = encodings.configured().and_then(language_driver) {
            meta.language_driver = driver;
        }
        let mut bytes = meta.to_bytes()?;
        bytes.push(EOF_MARKER);

        fs::write(path, &bytes).await.map_err(DbfError::io("writing new table"))?;
        if version.requires_memo_file() && find_memo_file(path).await.is_none() {
            fs::write(path.with_extension(MEMO_EXTENSIONS[0]), empty_memo_block())
                .await
                .map_err(DbfError::io("writing memo file"))?;
        }
        tracing::debug!(path = %path.display(), fields = meta.fields.len(), "created table");

        Table::open(path, options).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `.dbt` file found next to a memo table.
    pub fn memo_path(&self) -> Option<&Path> {
        self.memo_path.as_deref()
    }

    pub fn version(&self) -> Version {
        self.meta.version
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.meta.fields
    }

    /// Records on disk, deleted ones included.
    pub fn records_count(&self) -> u32 {
        self.meta.records_count
    }

    pub fn last_update(&self) -> Option<NaiveDate> {
        self.meta.last_update
    }

    pub fn header_len(&self) -> usize {
        self.meta.header_len
    }

    pub fn record_len(&self) -> usize {
        self.meta.record_len
    }

    /// Number of record slots already visited by reads.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Moves the read cursor, clamped to the record count.
    pub fn seek(&mut self, position: u32) {
        self.cursor = position.min(self.meta.records_count);
    }

    pub fn rewind(&mut self) {
        self.seek(0);
    }

    pub fn encoding_for(&self, field: &str) -> &'static Encoding {
        self.encodings.for_field(field)
    }

    fn record_offset(&self, index: u32) -> u64 {
        self.meta.header_len as u64 + index as u64 * self.meta.record_len as u64
    }
}

/// `read_exact` that reports a short file as a malformed header.
async fn read_fully(file: &mut File, buf: &mut [u8]) -> Result<()> {
    match file.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(DbfError::DescriptorMalformed("file ends inside the header".to_owned()))
        },
        Err(e) => Err(DbfError::io("reading header")(e))
    }
}

/// Looks for `<stem>.dbt` then `<stem>.DBT` next to the table.
async fn find_memo_file(path: &Path) -> Option<PathBuf> {
    for extension in MEMO_EXTENSIONS.iter() {
        let candidate = path.with_extension(extension);
        if let Ok(meta) = fs::metadata(&candidate).await {
            if meta.is_file() {
                return Some(candidate)
            }
        }
    }
    None
}

/// A dBase III memo file with no memos: next free block is 1.
fn empty_memo_block() -> Vec<u8> {
    let mut block = vec![0u8; MEMO_BLOCK_LEN];
    block[0..4].copy_from_slice(&1u32.to_le_bytes());
    block
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
