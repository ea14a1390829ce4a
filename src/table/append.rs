use std::io::SeekFrom;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::{today, Table};
use crate::error::{DbfError, Result};
use crate::field::{Record, Value};
use crate::header::{date_stamp, EOF_MARKER};

const ACTIVE_MARKER: u8 = b' ';

impl Table {
    /// Appends `records` after the last record and updates the header.
    ///
    /// Every record is checked against the field descriptors first; one bad
    /// value rejects the whole batch before anything is written. Fields
    /// missing from a record are written as null, names that match no
    /// field are ignored.
    ///
    /// The header is rewritten only after all records are on disk. An I/O
    /// failure in between leaves more records in the file than the header
    /// counts.
    pub async fn append_many(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(())
        }
        self.validate(records)?;

        let added = u32::try_from(records.len()).ok();
        let records_count = match added.and_then(|n| self.meta.records_count.checked_add(n)) {
            Some(n) => n,
            None => {
                return Err(DbfError::Io {
                    context: "appending records",
                    source: std::io::Error::new(std::io::ErrorKind::Other, "record count overflows the header")
                })
            }
        };

        let record_len = self.meta.record_len;
        let offsets = self.meta.field_offsets();
        let mut position = self.record_offset(self.meta.records_count);
        let mut buffer = vec![0u8; record_len];

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .map_err(DbfError::io("opening table for append"))?;
        file.seek(SeekFrom::Start(position)).await.map_err(DbfError::io("seeking to end of records"))?;

        for record in records {
            // slack between the last field and record_len stays blank
            buffer.fill(b' ');
            buffer[0] = ACTIVE_MARKER;
            for (field, offset) in self.meta.fields.iter().zip(&offsets) {
                let value = record.get(&field.name).unwrap_or(&Value::Null);
                let window = &mut buffer[*offset..*offset + field.size];
                field.encode(value, self.encodings.for_field(&field.name), window)?;
            }
            file.write_all(&buffer).await.map_err(DbfError::io("writing record"))?;
            position += record_len as u64;
        }

        let last_update = today();
        file.seek(SeekFrom::Start(1)).await.map_err(DbfError::io("seeking to header"))?;
        file.write_all(&date_stamp(Some(last_update))).await.map_err(DbfError::io("writing last update"))?;
        file.write_all(&records_count.to_le_bytes()).await.map_err(DbfError::io("writing record count"))?;

        file.seek(SeekFrom::Start(position)).await.map_err(DbfError::io("seeking to end of records"))?;
        file.write_all(&[EOF_MARKER]).await.map_err(DbfError::io("writing end of file marker"))?;
        file.flush().await.map_err(DbfError::io("flushing table"))?;
        drop(file);

        self.meta.records_count = records_count;
        self.meta.last_update = Some(last_update);
        tracing::debug!(path = %self.path.display(), appended = records.len(), records = records_count, "appended records");

        Ok(())
    }

    fn validate(&self, records: &[Record]) -> Result<()> {
        if let Some(field) = self.meta.fields.iter().find(|f| !f.field_type.writable()) {
            return Err(DbfError::UnsupportedFieldType {
                field: field.name.clone(),
                tag: field.field_type.flag() as char
            })
        }

        for (index, record) in records.iter().enumerate() {
            for field in &self.meta.fields {
                if let Some(value) = record.get(&field.name) {
                    field.field_type.accepts(value).map_err(|expected| DbfError::RecordValidationFailed {
                        record: index,
                        field: field.name.clone(),
                        expected,
                        found: value.kind()
                    })?;
                }
            }
        }

        Ok(())
    }
}
