use std::collections::HashMap;

use encoding_rs::{Encoding, WINDOWS_1252};

use crate::error::{DbfError, Result};
use crate::get_encoding;
use crate::header::Version;

#[cfg(test)]
mod tests;

/// How much structural damage a reader accepts before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Strict,
    Loose
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Reject,
    Tolerate
}

/// Two independent read-side policies.
///
/// `structure` covers the file itself: unknown version byte, missing memo
/// file, record length disagreeing with the descriptors. `field_types`
/// covers decoding a field whose type tag the codec does not know.
/// Neither one is consulted on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    pub structure: Policy,
    pub field_types: Policy
}

impl From<ReadMode> for Tolerance {
    fn from(mode: ReadMode) -> Tolerance {
        match mode {
            ReadMode::Strict => Tolerance { structure: Policy::Reject, field_types: Policy::Reject },
            ReadMode::Loose => Tolerance { structure: Policy::Tolerate, field_types: Policy::Tolerate }
        }
    }
}

impl Default for Tolerance {
    fn default() -> Tolerance {
        ReadMode::default().into()
    }
}

/// Charset configuration for text-bearing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingConfig {
    /// One label for every field
    Single(String),
    /// Per-field labels with a mandatory default
    PerField {
        default: String,
        fields: HashMap<String, String>
    }
}

impl EncodingConfig {
    /// Builds a per-field configuration from `field name -> label` pairs.
    /// The pairs must contain a `default` entry.
    pub fn from_map<I, K, V>(entries: I) -> Result<EncodingConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>
    {
        let mut fields: HashMap<String, String> = entries.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        match fields.remove("default") {
            Some(default) => Ok(EncodingConfig::PerField { default, fields }),
            None => Err(DbfError::InvalidConfiguration(
                "per-field encoding map needs a 'default' entry".to_owned()
            ))
        }
    }
}

impl From<&str> for EncodingConfig {
    fn from(label: &str) -> EncodingConfig {
        EncodingConfig::Single(label.to_owned())
    }
}

impl From<String> for EncodingConfig {
    fn from(label: String) -> EncodingConfig {
        EncodingConfig::Single(label)
    }
}

/// Maps a field name to the charset its text is stored in.
///
/// Every label is looked up once when the resolver is built, so a bad
/// label fails before the table file is touched.
#[derive(Debug, Clone)]
pub struct EncodingResolver {
    configured: Option<&'static Encoding>,
    fields: HashMap<String, &'static Encoding>,
    fallback: &'static Encoding
}

impl EncodingResolver {
    pub fn new(config: Option<&EncodingConfig>) -> Result<EncodingResolver> {
        let (configured, fields) = match config {
            None => (None, HashMap::new()),
            Some(EncodingConfig::Single(label)) => (Some(get_encoding(label)?), HashMap::new()),
            Some(EncodingConfig::PerField { default, fields }) => {
                let mut resolved = HashMap::with_capacity(fields.len());
                for (name, label) in fields {
                    resolved.insert(name.clone(), get_encoding(label)?);
                }
                (Some(get_encoding(default)?), resolved)
            }
        };

        Ok(EncodingResolver {
            configured,
            fields,
            fallback: WINDOWS_1252
        })
    }

    /// Charset used when nothing was configured, typically derived from
    /// the header's language driver byte.
    pub fn with_fallback(mut self, fallback: &'static Encoding) -> EncodingResolver {
        self.fallback = fallback;
        self
    }

    /// The single or default charset, if one was configured.
    pub fn configured(&self) -> Option<&'static Encoding> {
        self.configured
    }

    pub fn for_field(&self, name: &str) -> &'static Encoding {
        match self.fields.get(name) {
            Some(e) => *e,
            None => self.configured.unwrap_or(self.fallback)
        }
    }
}

/// Language driver id (header byte 29) to an `encoding_rs` label.
/// Drivers without a WHATWG encoding map to `None`.
pub fn codepage_label(driver: u8) -> Option<&'static str> {
    match driver {
        3 | 87 => Some("windows-1252"),
        4 => Some("macintosh"),
        101 => Some("ibm866"),
        120 => Some("big5"),
        121 => Some("euc-kr"),
        122 => Some("gbk"),
        123 => Some("shift_jis"),
        124 => Some("tis-620"),
        125 => Some("windows-1255"),
        126 => Some("windows-1256"),
        150 => Some("x-mac-cyrillic"),
        200 => Some("windows-1250"),
        201 => Some("windows-1251"),
        202 => Some("windows-1254"),
        203 => Some("windows-1253"),
        204 => Some("windows-1257"),
        _ => None
    }
}

/// Reverse of [codepage_label]: the first driver id whose label resolves
/// to `encoding`.
pub fn language_driver(encoding: &'static Encoding) -> Option<u8> {
    (1..=u8::MAX).find(|driver| {
        codepage_label(*driver).and_then(|label| Encoding::for_label(label.as_bytes())) == Some(encoding)
    })
}

/// Options accepted by [Table::open](../table/struct.Table.html#method.open)
/// and [Table::create](../table/struct.Table.html#method.create).
#[derive(Debug, Clone)]
pub struct Options {
    pub tolerance: Tolerance,
    pub encoding: Option<EncodingConfig>,
    pub include_deleted_records: bool,
    /// Only read by `create`
    pub file_version: Version
}

impl Default for Options {
    fn default() -> Options {
        Options {
            tolerance: Tolerance::default(),
            encoding: None,
            include_deleted_records: false,
            file_version: Version::DBaseIIIPlus
        }
    }
}

impl Options {
    pub fn read_mode(mut self, mode: ReadMode) -> Options {
        self.tolerance = mode.into();
        self
    }

    pub fn loose(self) -> Options {
        self.read_mode(ReadMode::Loose)
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Options {
        self.tolerance = tolerance;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<EncodingConfig>) -> Options {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn include_deleted_records(mut self, include: bool) -> Options {
        self.include_deleted_records = include;
        self
    }

    pub fn with_file_version(mut self, version: Version) -> Options {
        self.file_version = version;
        self
    }
}
