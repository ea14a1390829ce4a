use futures::stream::{self, Stream, TryStreamExt};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{Table, SCAN_BATCH};
use crate::error::{DbfError, Result};
use crate::field::{FieldType, Record, RecordEntry};
use crate::options::Policy;

const DELETED_MARKER: u8 = b'*';

impl Table {
    /// Reads up to `max` record slots starting at the cursor.
    ///
    /// The request is clamped to the slots left, so an exhausted table
    /// yields an empty vector. Deleted slots advance the cursor but are
    /// only returned when the table was opened with
    /// `include_deleted_records`. If any field fails to decode the cursor
    /// does not move.
    pub async fn read_next(&mut self, max: u32) -> Result<Vec<RecordEntry>> {
        let count = max.min(self.meta.records_count.saturating_sub(self.cursor));
        if count == 0 {
            return Ok(vec![])
        }

        let record_len = self.meta.record_len;
        let mut buffer = vec![0u8; count as usize * record_len];
        let mut file = File::open(&self.path).await.map_err(DbfError::io("opening table"))?;
        file.seek(SeekFrom::Start(self.record_offset(self.cursor)))
            .await
            .map_err(DbfError::io("seeking to records"))?;
        file.read_exact(&mut buffer).await.map_err(DbfError::io("reading records"))?;
        drop(file);

        if self.tolerance.field_types == Policy::Tolerate {
            for field in self.meta.fields.iter().filter(|f| matches!(f.field_type, FieldType::Unknown(_))) {
                tracing::warn!(field = %field.name, "field of unknown type read as null");
            }
        }

        let offsets = self.meta.field_offsets();
        let mut entries = Vec::with_capacity(count as usize);
        for raw in buffer.chunks_exact(record_len) {
            let deleted = raw[0] == DELETED_MARKER;
            if deleted && !self.include_deleted {
                continue
            }
            let record = self.decode_record(raw, &offsets)?;
            entries.push(if deleted {
                RecordEntry::Deleted(record)
            } else {
                RecordEntry::Active(record)
            });
        }

        self.cursor += count;
        tracing::debug!(path = %self.path.display(), visited = count, returned = entries.len(), cursor = self.cursor, "read records");

        Ok(entries)
    }

    /// Streams every remaining record from the current cursor.
    ///
    /// Reads happen in batches of [SCAN_BATCH] slots. The stream moves the
    /// same cursor as [Table::read_next], so scanning again yields nothing
    /// until the table is rewound.
    pub fn scan(&mut self) -> impl Stream<Item = Result<RecordEntry>> + '_ {
        stream::try_unfold(self, |table| async move {
            if table.cursor >= table.meta.records_count {
                return Ok::<_, DbfError>(None)
            }
            let batch = table.read_next(SCAN_BATCH).await?;
            Ok(Some((stream::iter(batch.into_iter().map(Ok::<RecordEntry, DbfError>)), table)))
        })
        .try_flatten()
    }

    fn decode_record(&self, raw: &[u8], offsets: &[usize]) -> Result<Record> {
        let mut record = Record::new();
        for (field, offset) in self.meta.fields.iter().zip(offsets) {
            let window = &raw[*offset..*offset + field.size];
            let encoding = self.encodings.for_field(&field.name);
            let value = field.decode(window, encoding, self.tolerance.field_types)?;
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }
}
