use chrono::naive::NaiveDate;
use chrono::Datelike;
use std::{
    collections::HashSet,
    convert::TryInto
};

use crate::error::{DbfError, Result};
use crate::field::{FieldDescriptor, FieldType};
use crate::options::Policy;


pub const HEADER_PREFIX_LEN: usize = 32;
pub const DESCRIPTOR_LEN: usize = 32;
pub const HEADER_TERMINATOR: u8 = 0x0D;
pub const EOF_MARKER: u8 = 0x1A;
pub const MAX_NAME_LEN: usize = 10;
const YEAR_EPOCH: i32 = 1900;

/// Version byte of a dbf file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    FoxBase,
    DBaseIIIPlus,
    DBaseIV,
    DBaseV,
    VisualFoxPro,
    VisualFoxProAutoInc,
    VisualFoxProVarBLOB,
    DBaseIVSQLTableFiles,
    DBaseIVSQLSystem,
    DBaseIIIPlusMemos,
    DBaseIVMemos,
    DBaseIVSQLTable,
    FoxProMemos,
    Other(u8)
}

impl Version {
    pub fn parse_type(flag: u8) -> Version {
        match flag {
            0x02 => Version::FoxBase,
            0x03 => Version::DBaseIIIPlus,
            0x04 => Version::DBaseIV,
            0x05 => Version::DBaseV,
            0x30 => Version::VisualFoxPro,
            0x31 => Version::VisualFoxProAutoInc,
            0x32 => Version::VisualFoxProVarBLOB,
            0x43 => Version::DBaseIVSQLTableFiles,
            0x63 => Version::DBaseIVSQLSystem,
            0x83 => Version::DBaseIIIPlusMemos,
            0x8b => Version::DBaseIVMemos,
            0x8e => Version::DBaseIVSQLTable,
            0xf5 => Version::FoxProMemos,
            other => Version::Other(other)
        }
    }

    pub fn flag(&self) -> u8 {
        match self {
            Version::FoxBase => 0x02,
            Version::DBaseIIIPlus => 0x03,
            Version::DBaseIV => 0x04,
            Version::DBaseV => 0x05,
            Version::VisualFoxPro => 0x30,
            Version::VisualFoxProAutoInc => 0x31,
            Version::VisualFoxProVarBLOB => 0x32,
            Version::DBaseIVSQLTableFiles => 0x43,
            Version::DBaseIVSQLSystem => 0x63,
            Version::DBaseIIIPlusMemos => 0x83,
            Version::DBaseIVMemos => 0x8b,
            Version::DBaseIVSQLTable => 0x8e,
            Version::FoxProMemos => 0xf5,
            Version::Other(flag) => *flag
        }
    }

    /// Versions this crate reads and writes without tolerance.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Version::DBaseIIIPlus | Version::DBaseIIIPlusMemos | Version::DBaseIVMemos | Version::VisualFoxPro
        )
    }

    /// Versions whose memo fields live in a `.dbt` file.
    pub fn requires_memo_file(&self) -> bool {
        matches!(self, Version::DBaseIIIPlusMemos | Version::DBaseIVMemos)
    }

    pub fn max_decimal_places(&self) -> usize {
        match self {
            Version::DBaseIVMemos => 18,
            _ => 15
        }
    }
}

/// Table header and field descriptors.
///
/// ## Header Structure
/// ---
/// | Byte offset | Description |
/// ---
/// | 0 | Version |
/// | 1 - 3 | Date of last update as YYMMDD, year counted from 1900 |
/// | 4 - 7 | Number of records, little endian |
/// | 8 - 9 | Header length including the terminator, little endian |
/// | 10 - 11 | Record length including the delete marker, little endian |
/// | 12 - 28 | Reserved |
/// | 29 | Language driver id |
/// | 30 - 31 | Reserved |
/// | 32 - n | Field descriptors, 32 bytes each |
/// | n + 1 | 0x0D terminator |
///
/// ## Field Descriptor Structure
/// ---
/// | Byte offset | Description |
/// ---
/// | 0 - 10 | Field name, right hand padded with 0 |
/// | 11 | Field type, see [FieldType](../field/enum.FieldType.html) |
/// | 12 - 15 | Reserved |
/// | 16 | Length of field (bytes) |
/// | 17 | Number of decimal places |
/// | 18 - 31 | Reserved |
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: Version,
    pub last_update: Option<NaiveDate>,
    pub records_count: u32,
    pub header_len: usize,
    pub record_len: usize,
    pub language_driver: u8,
    pub fields: Vec<FieldDescriptor>
}

impl Header {
    /// Builds the header of an empty table with canonical lengths.
    pub fn new(version: Version, fields: Vec<FieldDescriptor>, last_update: NaiveDate) -> Header {
        Header {
            version,
            last_update: Some(last_update),
            records_count: 0,
            header_len: HEADER_PREFIX_LEN + DESCRIPTOR_LEN * fields.len() + 1,
            record_len: 1 + fields.iter().map(|f| f.size).sum::<usize>(),
            language_driver: 0,
            fields
        }
    }

    /// Reads the header length out of the first 32 bytes so the caller
    /// knows how much more to read.
    pub fn peek_len(prefix: &[u8]) -> Result<usize> {
        if prefix.len() < HEADER_PREFIX_LEN {
            return Err(DbfError::DescriptorMalformed(format!(
                "file is {} bytes, shorter than a header", prefix.len()
            )))
        }
        Ok(u16::from_le_bytes([prefix[8], prefix[9]]) as usize)
    }

    /// Parses the header block, `bytes` being at least `header_len` long.
    ///
    /// The version byte is not checked here. A record length that
    /// disagrees with the field sizes is rejected unless `structure`
    /// tolerates it, but fields never may overrun the record.
    pub fn parse(bytes: &[u8], structure: Policy) -> Result<Header> {
        let header_len = Header::peek_len(bytes)?;
        if header_len < HEADER_PREFIX_LEN + 1 || header_len > bytes.len() {
            return Err(DbfError::DescriptorMalformed(format!(
                "header length {} outside 33..={}", header_len, bytes.len()
            )))
        }

        let version = Version::parse_type(bytes[0]);
        let last_update = NaiveDate::from_ymd_opt(YEAR_EPOCH + bytes[1] as i32, bytes[2] as u32, bytes[3] as u32);
        let records_count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let record_len = u16::from_le_bytes([bytes[10], bytes[11]]) as usize;
        let language_driver = bytes[29];

        let fields = read_fields(&bytes[HEADER_PREFIX_LEN..header_len])?;

        let expected_len = 1 + fields.iter().map(|f| f.size).sum::<usize>();
        if expected_len != record_len {
            if expected_len > record_len || structure == Policy::Reject {
                return Err(DbfError::DescriptorMalformed(format!(
                    "record length {} but fields need {}", record_len, expected_len
                )))
            }
            tracing::warn!(record_len, expected_len, "record length disagrees with field sizes");
        }

        Ok(Header {
            version,
            last_update,
            records_count,
            header_len,
            record_len,
            language_driver,
            fields
        })
    }

    /// Serializes the header block, terminator included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header_len: u16 = self.header_len.try_into()
            .map_err(|_| DbfError::DescriptorMalformed(format!("header length {} too large", self.header_len)))?;
        let record_len: u16 = self.record_len.try_into()
            .map_err(|_| DbfError::DescriptorMalformed(format!("record length {} too large", self.record_len)))?;

        let mut bytes = vec![0u8; self.header_len];
        bytes[0] = self.version.flag();
        bytes[1..4].copy_from_slice(&date_stamp(self.last_update));
        bytes[4..8].copy_from_slice(&self.records_count.to_le_bytes());
        bytes[8..10].copy_from_slice(&header_len.to_le_bytes());
        bytes[10..12].copy_from_slice(&record_len.to_le_bytes());
        bytes[29] = self.language_driver;

        let mut offset = HEADER_PREFIX_LEN;
        for field in &self.fields {
            let entry = &mut bytes[offset..offset + DESCRIPTOR_LEN];
            let name = field.name.as_bytes();
            let name_len = name.len().min(MAX_NAME_LEN);
            entry[..name_len].copy_from_slice(&name[..name_len]);
            entry[11] = field.field_type.flag();
            entry[16] = field.size as u8;
            entry[17] = field.decimal_places as u8;
            offset += DESCRIPTOR_LEN;
        }
        bytes[offset] = HEADER_TERMINATOR;

        Ok(bytes)
    }

    /// Byte offset of every field inside a record, after the delete marker.
    pub fn field_offsets(&self) -> Vec<usize> {
        self.fields.iter()
            .scan(1usize, |offset, f| {
                let start = *offset;
                *offset += f.size;
                Some(start)
            })
            .collect()
    }
}

/// Three byte YYMMDD stamp written at offset 1.
pub fn date_stamp(date: Option<NaiveDate>) -> [u8; 3] {
    match date {
        Some(d) => [
            (d.year() - YEAR_EPOCH).clamp(0, 255) as u8,
            d.month() as u8,
            d.day() as u8
        ],
        None => [0, 0, 0]
    }
}

fn read_fields(block: &[u8]) -> Result<Vec<FieldDescriptor>> {
    let mut fields = vec![];
    let mut entries = block.chunks(DESCRIPTOR_LEN);

    loop {
        let entry = match entries.next() {
            Some(e) => e,
            None => {
                return Err(DbfError::DescriptorMalformed(
                    "field descriptors run past the header without a terminator".to_owned()
                ))
            }
        };
        match read_field_meta(entry) {
            Some(field) => fields.push(field),
            None if entry[0] == HEADER_TERMINATOR || entry[0] == 0 => return Ok(fields),
            None => {
                return Err(DbfError::DescriptorMalformed(format!(
                    "truncated field descriptor {}", fields.len()
                )))
            }
        }
    }
}

fn read_field_meta(bytes: &[u8]) -> Option<FieldDescriptor> {
    if bytes.len() < DESCRIPTOR_LEN || bytes[0] == HEADER_TERMINATOR || bytes[0] == 0 {
        return None
    }

    let name_end = bytes[..11].iter().position(|b| *b == 0).unwrap_or(11);
    // names are ASCII by convention; latin-1 keeps stray high bytes readable
    let name: String = bytes[..name_end].iter().map(|b| *b as char).collect();

    Some(FieldDescriptor {
        name: name.trim().to_owned(),
        field_type: FieldType::from_flag(bytes[11]),
        size: bytes[16] as usize,
        decimal_places: bytes[17] as usize
    })
}

/// Create-time checks on the descriptor list.
pub fn validate_fields(fields: &[FieldDescriptor], version: Version) -> Result<()> {
    if fields.is_empty() {
        return Err(DbfError::DescriptorInvalid {
            field: String::new(),
            reason: "a table needs at least one field".to_owned()
        })
    }

    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        validate_field(field, version)?;
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(field, "duplicate field name".to_owned()))
        }
    }

    let header_len = HEADER_PREFIX_LEN + DESCRIPTOR_LEN * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.size).sum::<usize>();
    if let Some(last) = fields.last() {
        if header_len > u16::MAX as usize || record_len > u16::MAX as usize {
            return Err(invalid(last, format!(
                "{} fields of {} bytes do not fit a dbf header", fields.len(), record_len
            )))
        }
    }
    Ok(())
}

fn validate_field(field: &FieldDescriptor, version: Version) -> Result<()> {
    let name = &field.name;
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid(field, format!("name must be 1 to {} characters", MAX_NAME_LEN)))
    }
    if !name.is_ascii() || name.bytes().any(|b| b == 0) || name.trim() != name {
        return Err(invalid(field, "name must be trimmed ASCII without NUL".to_owned()))
    }

    let (min, max) = match field.field_type.size_range() {
        Some(range) if field.field_type.writable() => range,
        _ => {
            return Err(invalid(field, format!("type '{}' cannot be created", field.field_type.flag() as char)))
        }
    };
    if field.size < min || field.size > max {
        let expected = if min == max {
            format!("exactly {}", min)
        } else {
            format!("between {} and {}", min, max)
        };
        return Err(invalid(field, format!("size {} must be {}", field.size, expected)))
    }

    if field.decimal_places > version.max_decimal_places() {
        return Err(invalid(field, format!(
            "{} decimal places exceeds {}", field.decimal_places, version.max_decimal_places()
        )))
    }

    Ok(())
}

fn invalid(field: &FieldDescriptor, reason: String) -> DbfError {
    DbfError::DescriptorInvalid { field: field.name.clone(), reason }
}
