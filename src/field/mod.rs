use chrono::naive::{
    NaiveDate,
    NaiveDateTime
};
use chrono::{Datelike, Timelike};
use encoding_rs::{Encoding, EncoderResult, WINDOWS_1252};
use std::{
    convert::TryInto,
    fmt::{
        self,
        Display
    },
    ops::Index
};

use crate::error::{DbfError, Result};
use crate::options::Policy;


/// Julian day number of 0001-01-01 minus one, the day chrono counts from.
const JULIAN_DAY_OFFSET: i32 = 1_721_425;
const MILLIS_PER_DAY: u32 = 86_400_000;

/// Field type tag as stored at byte 11 of a field descriptor.
///
/// | Tag | Type | On disk |
/// |-----|------|---------|
/// | C | Character | charset text, space padded |
/// | N | Numeric | ASCII number, right aligned |
/// | F | Float | same as Numeric |
/// | L | Logical | `T`/`Y`/`F`/`N`/space |
/// | D | Date | `YYYYMMDD` |
/// | I | Integer | 4 bytes little endian |
/// | T | DateTime | 4 bytes Julian day, 4 bytes milliseconds since midnight |
/// | B | Double | 8 bytes IEEE little endian |
/// | M | Memo | block number into the `.dbt` side file |
/// | 0 | Null flags | opaque bit flags maintained by FoxPro |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Integer,
    DateTime,
    Double,
    Memo,
    NullFlags,
    /// Any tag not listed above
    Unknown(u8)
}

impl FieldType {
    pub fn from_flag(flag: u8) -> FieldType {
        match flag {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'L' => FieldType::Logical,
            b'D' => FieldType::Date,
            b'I' => FieldType::Integer,
            b'T' => FieldType::DateTime,
            b'B' => FieldType::Double,
            b'M' => FieldType::Memo,
            b'0' => FieldType::NullFlags,
            other => FieldType::Unknown(other)
        }
    }

    pub fn flag(&self) -> u8 {
        match self {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Float => b'F',
            FieldType::Logical => b'L',
            FieldType::Date => b'D',
            FieldType::Integer => b'I',
            FieldType::DateTime => b'T',
            FieldType::Double => b'B',
            FieldType::Memo => b'M',
            FieldType::NullFlags => b'0',
            FieldType::Unknown(flag) => *flag
        }
    }

    /// Whether values of this type can be written without a memo file.
    pub fn writable(&self) -> bool {
        !matches!(self, FieldType::Memo | FieldType::Unknown(_))
    }

    /// Width bounds enforced when a table is created.
    pub fn size_range(&self) -> Option<(usize, usize)> {
        match self {
            FieldType::Character => Some((1, 255)),
            FieldType::Numeric | FieldType::Float => Some((1, 20)),
            FieldType::Logical => Some((1, 1)),
            FieldType::Integer => Some((4, 4)),
            FieldType::Date | FieldType::DateTime | FieldType::Double => Some((8, 8)),
            FieldType::NullFlags => Some((1, 255)),
            FieldType::Memo | FieldType::Unknown(_) => None
        }
    }

    /// Name of the value family this type accepts on append.
    fn family(&self) -> &'static str {
        match self {
            FieldType::Character => "text",
            FieldType::Numeric | FieldType::Float | FieldType::Integer | FieldType::Double => "number",
            FieldType::Logical => "logical",
            FieldType::Date | FieldType::DateTime => "date",
            FieldType::NullFlags => "bytes",
            FieldType::Memo | FieldType::Unknown(_) => "nothing"
        }
    }

    /// Checks that `value` belongs to this type's family. Null always fits.
    pub fn accepts(&self, value: &Value) -> std::result::Result<(), &'static str> {
        let fits = match (self, value) {
            (_, Value::Null) => true,
            (FieldType::Character, Value::Text(_)) => true,
            (FieldType::Numeric, Value::Number(_))
            | (FieldType::Float, Value::Number(_))
            | (FieldType::Integer, Value::Number(_))
            | (FieldType::Double, Value::Number(_)) => true,
            (FieldType::Logical, Value::Logical(_)) => true,
            (FieldType::Date, Value::Date(_))
            | (FieldType::Date, Value::DateTime(_))
            | (FieldType::DateTime, Value::Date(_))
            | (FieldType::DateTime, Value::DateTime(_)) => true,
            // the codec zero fills anything it cannot turn into flag bytes
            (FieldType::NullFlags, _) => true,
            _ => false
        };
        if fits {
            Ok(())
        } else {
            Err(self.family())
        }
    }

    fn decode(&self, name: &str, window: &[u8], encoding: &'static Encoding, unknown: Policy) -> Result<Value> {
        let value = match self {
            FieldType::Character => Value::Text(decode_text(window, encoding).trim().to_owned()),
            FieldType::Numeric | FieldType::Float => decode_number(window),
            FieldType::Logical => decode_logical(window),
            FieldType::Date => decode_date(window),
            FieldType::Integer => match window.try_into() {
                Ok(bytes) => Value::Number(i32::from_le_bytes(bytes) as f64),
                Err(_) => Value::Null
            },
            FieldType::Double => match window.try_into() {
                Ok(bytes) => Value::Number(f64::from_le_bytes(bytes)),
                Err(_) => Value::Null
            },
            FieldType::DateTime => decode_datetime(window),
            FieldType::Memo => decode_memo_block(window),
            FieldType::NullFlags => Value::Bytes(window.to_vec()),
            FieldType::Unknown(tag) => match unknown {
                Policy::Reject => {
                    return Err(DbfError::UnsupportedFieldType { field: name.to_owned(), tag: *tag as char })
                },
                Policy::Tolerate => Value::Null
            }
        };

        Ok(value)
    }

    fn encode(&self, field: &FieldDescriptor, value: &Value, encoding: &'static Encoding, window: &mut [u8]) -> Result<()> {
        match self {
            FieldType::Character => {
                window.fill(b' ');
                if let Value::Text(s) = value {
                    encode_text(s, encoding, window);
                }
            },
            FieldType::Numeric | FieldType::Float => {
                window.fill(b' ');
                if let Value::Number(n) = value {
                    if n.is_finite() {
                        let text = format_number(*n, field.decimal_places, window.len());
                        copy_truncated(text.as_bytes(), window);
                    }
                }
            },
            FieldType::Logical => {
                window.fill(b' ');
                if let Some(first) = window.first_mut() {
                    *first = match value {
                        Value::Logical(true) => b'T',
                        Value::Logical(false) => b'F',
                        _ => b' '
                    };
                }
            },
            FieldType::Date => {
                window.fill(b' ');
                let date = match value {
                    Value::Date(d) => Some(*d),
                    Value::DateTime(dt) => Some(dt.date()),
                    _ => None
                };
                if let Some(d) = date {
                    let text = format!("{:04}{:02}{:02}", d.year(), d.month(), d.day());
                    copy_truncated(text.as_bytes(), window);
                }
            },
            FieldType::Integer => {
                let n = match value {
                    // `as` saturates at the i32 bounds
                    Value::Number(n) => n.round() as i32,
                    _ => 0
                };
                window.fill(0);
                copy_truncated(&n.to_le_bytes(), window);
            },
            FieldType::Double => {
                let n = match value {
                    Value::Number(n) => *n,
                    _ => 0.0
                };
                window.fill(0);
                copy_truncated(&n.to_le_bytes(), window);
            },
            FieldType::DateTime => {
                window.fill(0);
                let datetime = match value {
                    Value::DateTime(dt) => Some(*dt),
                    Value::Date(d) => d.and_hms_opt(0, 0, 0),
                    _ => None
                };
                if let Some(dt) = datetime {
                    let day = dt.date().num_days_from_ce() + JULIAN_DAY_OFFSET;
                    let millis = dt.time().num_seconds_from_midnight() * 1000
                        + dt.time().nanosecond() / 1_000_000;
                    let mut bytes = [0u8; 8];
                    bytes[0..4].copy_from_slice(&day.to_le_bytes());
                    bytes[4..8].copy_from_slice(&millis.min(MILLIS_PER_DAY - 1).to_le_bytes());
                    copy_truncated(&bytes, window);
                }
            },
            FieldType::NullFlags => {
                window.fill(0);
                let bytes = match value {
                    Value::Bytes(b) => Some(b.clone()),
                    Value::Text(s) => parse_escaped_hex(s),
                    _ => None
                };
                if let Some(b) = bytes {
                    copy_truncated(&b, window);
                }
            },
            FieldType::Memo | FieldType::Unknown(_) => {
                return Err(DbfError::UnsupportedFieldType {
                    field: field.name.clone(),
                    tag: self.flag() as char
                })
            }
        }

        Ok(())
    }
}

/// One column of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub size: usize,
    /// Only meaningful for Numeric and Float
    pub decimal_places: usize
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType, size: usize) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            field_type,
            size,
            decimal_places: 0
        }
    }

    pub fn with_decimal_places(mut self, decimal_places: usize) -> FieldDescriptor {
        self.decimal_places = decimal_places;
        self
    }

    pub fn character(name: impl Into<String>, size: usize) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldType::Character, size)
    }

    pub fn numeric(name: impl Into<String>, size: usize, decimal_places: usize) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldType::Numeric, size).with_decimal_places(decimal_places)
    }

    pub fn logical(name: impl Into<String>) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldType::Logical, 1)
    }

    pub fn date(name: impl Into<String>) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldType::Date, 8)
    }

    /// Decodes this field's window of a record.
    ///
    /// Values that do not parse come back as [Value::Null]. Only an unknown
    /// type tag can fail, and only when `unknown` is [Policy::Reject].
    pub fn decode(&self, window: &[u8], encoding: &'static Encoding, unknown: Policy) -> Result<Value> {
        self.field_type.decode(&self.name, window, encoding, unknown)
    }

    /// Encodes `value` into `window`, which must be exactly `size` bytes.
    ///
    /// Callers are expected to run [FieldType::accepts] first; a value of
    /// the wrong family is written as if it were null.
    pub fn encode(&self, value: &Value, encoding: &'static Encoding, window: &mut [u8]) -> Result<()> {
        self.field_type.encode(self, value, encoding, window)
    }
}

fn copy_truncated(src: &[u8], window: &mut [u8]) {
    let len = src.len().min(window.len());
    window[..len].copy_from_slice(&src[..len]);
}

/// Charset encodes `text` into the front of `window`. Characters the
/// charset cannot represent are stored as `?`, and encoding stops at the
/// last character that fits whole.
fn encode_text(text: &str, encoding: &'static Encoding, window: &mut [u8]) {
    let mut encoder = encoding.new_encoder();
    let mut read = 0;
    let mut written = 0;
    loop {
        let (result, r, w) = encoder.encode_from_utf8_without_replacement(&text[read..], &mut window[written..], true);
        read += r;
        written += w;
        match result {
            EncoderResult::Unmappable(_) => match window.get_mut(written) {
                Some(b) => {
                    *b = b'?';
                    written += 1;
                },
                None => break
            },
            EncoderResult::InputEmpty | EncoderResult::OutputFull => break
        }
    }
}

fn decode_text(window: &[u8], encoding: &'static Encoding) -> String {
    let (text, _) = encoding.decode_without_bom_handling(window);
    text.into_owned()
}

fn decode_number(window: &[u8]) -> Value {
    let text = decode_text(window, WINDOWS_1252);
    let text = text.trim();
    if text.is_empty() {
        return Value::Null
    }
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Null
    }
}

fn decode_logical(window: &[u8]) -> Value {
    match window.first() {
        Some(b'T') | Some(b't') | Some(b'Y') | Some(b'y') => Value::Logical(true),
        Some(b'F') | Some(b'f') | Some(b'N') | Some(b'n') => Value::Logical(false),
        _ => Value::Null
    }
}

fn decode_date(window: &[u8]) -> Value {
    if window.len() != 8 || !window.iter().all(u8::is_ascii_digit) {
        return Value::Null
    }
    let digits = |range: std::ops::Range<usize>| {
        window[range].iter().fold(0u32, |acc, d| acc * 10 + (d - b'0') as u32)
    };
    match NaiveDate::from_ymd_opt(digits(0..4) as i32, digits(4..6), digits(6..8)) {
        Some(d) => Value::Date(d),
        None => Value::Null
    }
}

fn decode_datetime(window: &[u8]) -> Value {
    if window.len() != 8 {
        return Value::Null
    }
    let day = i32::from_le_bytes([window[0], window[1], window[2], window[3]]);
    let millis = u32::from_le_bytes([window[4], window[5], window[6], window[7]]);
    if day == 0 && millis == 0 {
        return Value::Null
    }
    let date = match day.checked_sub(JULIAN_DAY_OFFSET).and_then(NaiveDate::from_num_days_from_ce_opt) {
        Some(d) => d,
        None => return Value::Null
    };
    match date.and_hms_milli_opt((millis / 3_600_000) % 24, (millis / 60_000) % 60, (millis / 1000) % 60, millis % 1000) {
        Some(dt) => Value::DateTime(dt),
        None => Value::Null
    }
}

/// Memo windows hold either ten ASCII digits (dBase) or a 4 byte
/// little endian block number (FoxPro). Only the block number is exposed.
fn decode_memo_block(window: &[u8]) -> Value {
    let block = if window.len() == 4 {
        u32::from_le_bytes([window[0], window[1], window[2], window[3]]) as f64
    } else {
        match decode_number(window) {
            Value::Number(n) => n,
            _ => 0.0
        }
    };
    if block > 0.0 {
        Value::Number(block)
    } else {
        Value::Null
    }
}

/// Renders `\x00\x1f` style text for opaque bytes.
pub fn escape_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{:02x}", b)).collect()
}

/// Inverse of [escape_hex]. Anything that is not a run of `\xHH` tokens
/// yields `None`.
pub fn parse_escaped_hex(text: &str) -> Option<Vec<u8>> {
    let raw = text.as_bytes();
    if raw.len() % 4 != 0 {
        return None
    }
    raw.chunks(4)
        .map(|token| match token {
            [b'\\', b'x', hi, lo] => Some(hex_digit(*hi)? << 4 | hex_digit(*lo)?),
            _ => None
        })
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Fixed point text for Numeric/Float windows, right aligned to `width`.
fn format_number(n: f64, decimal_places: usize, width: usize) -> String {
    let text = if decimal_places > 0 {
        format!("{:.*}", decimal_places, n)
    } else {
        // adding zero folds -0 into 0
        format!("{:.0}", n.round() + 0.0)
    };
    format!("{:>width$}", text, width = width)
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Logical(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Raw window of a null flags field
    Bytes(Vec<u8>)
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Logical(_) => "logical",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Bytes(_) => "bytes"
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Logical(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Bytes(b) => write!(f, "{}", escape_hex(b))
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Logical(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Value {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Value {
        Value::DateTime(dt)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Value {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null
        }
    }
}

static NULL: Value = Value::Null;

/// One row: field values in descriptor order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Sets `name`, replacing an earlier value for the same field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value))
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Record {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Missing fields index as [Value::Null].
impl Index<&str> for Record {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&NULL)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Record {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// A record read from disk together with its delete marker.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEntry {
    Active(Record),
    Deleted(Record)
}

impl RecordEntry {
    pub fn record(&self) -> &Record {
        match self {
            RecordEntry::Active(r) | RecordEntry::Deleted(r) => r
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            RecordEntry::Active(r) | RecordEntry::Deleted(r) => r
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, RecordEntry::Deleted(_))
    }
}
