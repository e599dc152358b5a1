//! Typed value conversion between industrial tag declarations and the four
//! canonical storage types.
//!
//! Controllers declare tags with a vendor vocabulary (`Bool`, `Word`,
//! `Int16`, `String[20]`, ...). Everything the gateway caches is normalized
//! to one of four canonical runtime types: 64-bit float, boolean, text, or a
//! byte sequence. This module owns that mapping:
//!
//! - [`DataType::resolve`] turns a declared type name into a [`DataType`]
//!   plus its byte width on the wire.
//! - [`DataType::convert`] performs bounds-checked conversion of a dynamic
//!   [`Value`] into a [`CanonicalValue`], packing the bit-addressable types
//!   (`Byte`/`Word`/`DWord`) into little-endian fixed-width byte arrays.
//! - [`to_f64`] / [`to_bytes`] are the best-effort canonicalizations used by
//!   the analytics and downstream writers.
//!
//! Conversions never silently clamp or wrap: every out-of-range or
//! wrong-shape input fails with [`TelemetryError::Conversion`] carrying the
//! source and target type names.

use std::fmt;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};

/// Length-suffixed Siemens string declarations: `String[n]` / `WString[n]`.
static SIZED_STRING_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    let pattern = Regex::new(r"^(W)?String\[(\d+)\]$").expect("sized-string pattern is valid");
    pattern
});

// =============================================================================
// Declared data types
// =============================================================================

/// The declared data type of an external tag.
///
/// This is the closed vocabulary of the configuration layer; vendor aliases
/// (`S5Time`, `Time_Of_Day`, `WString[n]`, ...) resolve onto these via
/// [`DataType::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Byte,
    Word,
    DWord,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
}

/// The four canonical storage types a series cache can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalKind {
    Float,
    Bool,
    Text,
    Bytes,
}

impl CanonicalKind {
    /// Human-readable name used in type-mismatch diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            CanonicalKind::Float => "float64",
            CanonicalKind::Bool => "bool",
            CanonicalKind::Text => "string",
            CanonicalKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "Bool",
            DataType::Byte => "Byte",
            DataType::Word => "Word",
            DataType::DWord => "DWord",
            DataType::Int8 => "Int8",
            DataType::UInt8 => "UInt8",
            DataType::Int16 => "Int16",
            DataType::UInt16 => "UInt16",
            DataType::Int32 => "Int32",
            DataType::UInt32 => "UInt32",
            DataType::Int64 => "Int64",
            DataType::UInt64 => "UInt64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::String => "String",
        };
        f.write_str(name)
    }
}

impl DataType {
    /// Resolve a declared type name to a `DataType` and its byte width.
    ///
    /// Recognizes the canonical vocabulary, the Siemens time/date aliases,
    /// and the length-suffixed `String[n]` / `WString[n]` forms (byte width
    /// n+2 narrow, n*2+4 wide). `String` without a length has no fixed width.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::UnknownType`] for anything outside the vocabulary.
    pub fn resolve(name: &str) -> TelemetryResult<(DataType, usize)> {
        let resolved = match name {
            "Bool" => (DataType::Bool, 1),
            "Byte" => (DataType::Byte, 1),
            "Word" => (DataType::Word, 2),
            "DWord" => (DataType::DWord, 4),
            "Int8" => (DataType::Int8, 1),
            "UInt8" => (DataType::UInt8, 1),
            "Int16" => (DataType::Int16, 2),
            "UInt16" => (DataType::UInt16, 2),
            "Int32" => (DataType::Int32, 4),
            "UInt32" => (DataType::UInt32, 4),
            "Int64" => (DataType::Int64, 8),
            "UInt64" => (DataType::UInt64, 8),
            "Float32" => (DataType::Float32, 4),
            "Float64" => (DataType::Float64, 8),
            "String" => (DataType::String, 0),
            // Vendor time/date types map onto fixed-width encodings.
            "S5Time" => (DataType::Int16, 2),
            "Time" => (DataType::Int32, 4),
            "LTime" => (DataType::Int64, 8),
            "DTL" => (DataType::String, 12),
            "Date" => (DataType::String, 2),
            "Date_And_Time" => (DataType::String, 8),
            "LDT" => (DataType::String, 8),
            "LTime_Of_Day" => (DataType::String, 8),
            "Time_Of_Day" => (DataType::String, 4),
            other => {
                if let Some(caps) = SIZED_STRING_RE.captures(other) {
                    let n: usize = caps[2].parse().map_err(|_| TelemetryError::UnknownType {
                        name: other.to_string(),
                    })?;
                    let width = if caps.get(1).is_some() { n * 2 + 4 } else { n + 2 };
                    (DataType::String, width)
                } else {
                    return Err(TelemetryError::UnknownType {
                        name: other.to_string(),
                    });
                }
            }
        };
        Ok(resolved)
    }

    /// The canonical storage type values of this declared type normalize to.
    pub fn canonical_kind(self) -> CanonicalKind {
        match self {
            DataType::Bool => CanonicalKind::Bool,
            DataType::String => CanonicalKind::Text,
            DataType::Byte | DataType::Word | DataType::DWord => CanonicalKind::Bytes,
            DataType::Int8
            | DataType::UInt8
            | DataType::Int16
            | DataType::UInt16
            | DataType::Int32
            | DataType::UInt32
            | DataType::Int64
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64 => CanonicalKind::Float,
        }
    }

    /// Convert a dynamic input value to this declared type's canonical form.
    ///
    /// Numeric targets range-check against the declared width and signedness
    /// before canonicalizing to float64; fractional floats truncate toward
    /// zero into integer targets. `Bool` coerces any nonzero numeric to true.
    /// `Byte`/`Word`/`DWord` pack integers and floats little-endian into
    /// 1/2/4 bytes, and accept byte or text sources no longer than the
    /// width (shorter sources are zero-padded).
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Conversion`] for any out-of-range or wrong-shape
    /// input.
    pub fn convert(self, value: &Value) -> TelemetryResult<CanonicalValue> {
        match self {
            DataType::Bool => match value {
                Value::Bool(b) => Ok(CanonicalValue::Bool(*b)),
                Value::Int(i) => Ok(CanonicalValue::Bool(*i != 0)),
                Value::UInt(u) => Ok(CanonicalValue::Bool(*u != 0)),
                Value::Float(f) => Ok(CanonicalValue::Bool(*f != 0.0)),
                _ => Err(self.conversion_error(value)),
            },
            DataType::Int8 => self.convert_integer(value, i8::MIN as i128, i8::MAX as i128),
            DataType::Int16 => self.convert_integer(value, i16::MIN as i128, i16::MAX as i128),
            DataType::Int32 => self.convert_integer(value, i32::MIN as i128, i32::MAX as i128),
            DataType::Int64 => self.convert_integer(value, i64::MIN as i128, i64::MAX as i128),
            DataType::UInt8 => self.convert_integer(value, 0, u8::MAX as i128),
            DataType::UInt16 => self.convert_integer(value, 0, u16::MAX as i128),
            DataType::UInt32 => self.convert_integer(value, 0, u32::MAX as i128),
            DataType::UInt64 => self.convert_integer(value, 0, u64::MAX as i128),
            DataType::Float32 => {
                let v = self.numeric(value)?;
                if !v.is_finite() || v.abs() > f32::MAX as f64 {
                    return Err(self.conversion_error(value));
                }
                Ok(CanonicalValue::Float((v as f32) as f64))
            }
            DataType::Float64 => Ok(CanonicalValue::Float(self.numeric(value)?)),
            DataType::String => match value {
                Value::Text(s) => Ok(CanonicalValue::Text(s.clone())),
                Value::Bytes(b) => Ok(CanonicalValue::Text(
                    String::from_utf8_lossy(b).into_owned(),
                )),
                other => Ok(CanonicalValue::Text(other.to_string())),
            },
            DataType::Byte => self.pack(value, 1),
            DataType::Word => self.pack(value, 2),
            DataType::DWord => self.pack(value, 4),
        }
    }

    /// Generate a random in-range value of this declared type.
    ///
    /// Used by script validation to build a plausible environment for a dry
    /// run before any real readings exist.
    pub fn sample_value(self) -> Value {
        let mut rng = rand::thread_rng();
        match self {
            DataType::Bool => Value::Bool(rng.gen()),
            DataType::Int8 => Value::Int(rng.gen_range(i8::MIN as i64..=i8::MAX as i64)),
            DataType::Int16 => Value::Int(rng.gen_range(i16::MIN as i64..=i16::MAX as i64)),
            DataType::Int32 => Value::Int(rng.gen_range(i32::MIN as i64..=i32::MAX as i64)),
            DataType::Int64 => Value::Int(rng.gen()),
            DataType::UInt8 => Value::UInt(rng.gen_range(0..=u8::MAX as u64)),
            DataType::UInt16 => Value::UInt(rng.gen_range(0..=u16::MAX as u64)),
            DataType::UInt32 => Value::UInt(rng.gen_range(0..=u32::MAX as u64)),
            DataType::UInt64 => Value::UInt(rng.gen()),
            DataType::Float32 => Value::Float(rng.gen::<f32>() as f64),
            DataType::Float64 => Value::Float(rng.gen()),
            DataType::String => {
                let s: String = (0..8)
                    .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                    .collect();
                Value::Text(s)
            }
            DataType::Byte => Value::Bytes(vec![rng.gen()]),
            DataType::Word => Value::Bytes((0..2).map(|_| rng.gen()).collect()),
            DataType::DWord => Value::Bytes((0..4).map(|_| rng.gen()).collect()),
        }
    }

    /// Range-checked conversion into an integer-valued canonical float.
    fn convert_integer(self, value: &Value, min: i128, max: i128) -> TelemetryResult<CanonicalValue> {
        let v = match value {
            Value::Int(i) => {
                let i = *i as i128;
                if i < min || i > max {
                    return Err(self.conversion_error(value));
                }
                i as f64
            }
            Value::UInt(u) => {
                let u = *u as i128;
                if u > max {
                    return Err(self.conversion_error(value));
                }
                u as f64
            }
            Value::Float(f) => {
                if !f.is_finite() || *f < min as f64 || *f > max as f64 {
                    return Err(self.conversion_error(value));
                }
                f.trunc()
            }
            _ => return Err(self.conversion_error(value)),
        };
        Ok(CanonicalValue::Float(v))
    }

    /// Any numeric variant as f64; non-numerics fail with a conversion error.
    fn numeric(self, value: &Value) -> TelemetryResult<f64> {
        match value {
            Value::Int(i) => Ok(*i as f64),
            Value::UInt(u) => Ok(*u as f64),
            Value::Float(f) => Ok(*f),
            _ => Err(self.conversion_error(value)),
        }
    }

    /// Pack a source value into a little-endian fixed-width byte array.
    fn pack(self, value: &Value, width: usize) -> TelemetryResult<CanonicalValue> {
        let max = match width {
            1 => u8::MAX as u64,
            2 => u16::MAX as u64,
            _ => u32::MAX as u64,
        };
        let le = |u: u64| u.to_le_bytes()[..width].to_vec();
        let packed = match value {
            Value::Bytes(b) => {
                if b.len() > width {
                    return Err(self.conversion_error(value));
                }
                let mut out = vec![0u8; width];
                out[..b.len()].copy_from_slice(b);
                out
            }
            Value::Text(s) => {
                let b = s.as_bytes();
                if b.len() > width {
                    return Err(self.conversion_error(value));
                }
                let mut out = vec![0u8; width];
                out[..b.len()].copy_from_slice(b);
                out
            }
            Value::Int(i) => {
                if *i < 0 || *i as u64 > max {
                    return Err(self.conversion_error(value));
                }
                le(*i as u64)
            }
            Value::UInt(u) => {
                if *u > max {
                    return Err(self.conversion_error(value));
                }
                le(*u)
            }
            Value::Float(f) => {
                if !f.is_finite() || *f < 0.0 || *f > max as f64 {
                    return Err(self.conversion_error(value));
                }
                le(f.trunc() as u64)
            }
            Value::Bool(_) => return Err(self.conversion_error(value)),
        };
        Ok(CanonicalValue::Bytes(packed))
    }

    fn conversion_error(self, value: &Value) -> TelemetryError {
        TelemetryError::Conversion {
            value: value.to_string(),
            from: value.type_name(),
            to: self.to_string(),
        }
    }
}

// =============================================================================
// Dynamic and canonical values
// =============================================================================

/// A dynamically typed input value, as handed over by the poller or the
/// expression engine before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Source type name used in conversion diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! value_from_uint {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::UInt(u64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64);
value_from_uint!(u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<CanonicalValue> for Value {
    fn from(v: CanonicalValue) -> Self {
        match v {
            CanonicalValue::Float(f) => Value::Float(f),
            CanonicalValue::Bool(b) => Value::Bool(b),
            CanonicalValue::Text(s) => Value::Text(s),
            CanonicalValue::Bytes(b) => Value::Bytes(b),
        }
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = TelemetryError;

    fn try_from(v: &serde_json::Value) -> TelemetryResult<Self> {
        match v {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(Value::UInt(u))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(TelemetryError::UnsupportedType {
                        actual: "number".to_string(),
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_u64() {
                        Some(b) if b <= u8::MAX as u64 => bytes.push(b as u8),
                        _ => {
                            return Err(TelemetryError::UnsupportedType {
                                actual: "array".to_string(),
                            })
                        }
                    }
                }
                Ok(Value::Bytes(bytes))
            }
            serde_json::Value::Null => Err(TelemetryError::UnsupportedType {
                actual: "null".to_string(),
            }),
            serde_json::Value::Object(_) => Err(TelemetryError::UnsupportedType {
                actual: "object".to_string(),
            }),
        }
    }
}

/// One of the four canonical storage values.
///
/// Serializes untagged so push payloads carry the bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl CanonicalValue {
    /// The canonical kind of this value.
    pub fn kind(&self) -> CanonicalKind {
        match self {
            CanonicalValue::Float(_) => CanonicalKind::Float,
            CanonicalValue::Bool(_) => CanonicalKind::Bool,
            CanonicalValue::Text(_) => CanonicalKind::Text,
            CanonicalValue::Bytes(_) => CanonicalKind::Bytes,
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalValue::Float(v) => write!(f, "{v}"),
            CanonicalValue::Bool(b) => write!(f, "{b}"),
            CanonicalValue::Text(s) => f.write_str(s),
            CanonicalValue::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

// =============================================================================
// Best-effort canonicalization
// =============================================================================

/// Best-effort float canonicalization of a dynamic value.
///
/// # Errors
///
/// [`TelemetryError::UnsupportedType`] for anything outside the numeric set.
pub fn to_f64(value: &Value) -> TelemetryResult<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::UInt(u) => Ok(*u as f64),
        Value::Float(f) => Ok(*f),
        other => Err(TelemetryError::UnsupportedType {
            actual: other.type_name().to_string(),
        }),
    }
}

/// Best-effort byte canonicalization of a dynamic value.
///
/// # Errors
///
/// [`TelemetryError::UnsupportedType`] for anything outside the byte-like set.
pub fn to_bytes(value: &Value) -> TelemetryResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        Value::Text(s) => Ok(s.as_bytes().to_vec()),
        other => Err(TelemetryError::UnsupportedType {
            actual: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_base_vocabulary_with_widths() {
        assert_eq!(DataType::resolve("Bool").unwrap(), (DataType::Bool, 1));
        assert_eq!(DataType::resolve("Word").unwrap(), (DataType::Word, 2));
        assert_eq!(DataType::resolve("DWord").unwrap(), (DataType::DWord, 4));
        assert_eq!(DataType::resolve("Int64").unwrap(), (DataType::Int64, 8));
        assert_eq!(DataType::resolve("Float32").unwrap(), (DataType::Float32, 4));
        assert_eq!(DataType::resolve("String").unwrap(), (DataType::String, 0));
    }

    #[test]
    fn resolves_vendor_aliases() {
        assert_eq!(DataType::resolve("S5Time").unwrap(), (DataType::Int16, 2));
        assert_eq!(DataType::resolve("Time").unwrap(), (DataType::Int32, 4));
        assert_eq!(DataType::resolve("LTime").unwrap(), (DataType::Int64, 8));
        assert_eq!(DataType::resolve("DTL").unwrap(), (DataType::String, 12));
        assert_eq!(
            DataType::resolve("Time_Of_Day").unwrap(),
            (DataType::String, 4)
        );
    }

    #[test]
    fn resolves_sized_strings() {
        assert_eq!(
            DataType::resolve("String[10]").unwrap(),
            (DataType::String, 12)
        );
        assert_eq!(
            DataType::resolve("WString[10]").unwrap(),
            (DataType::String, 24)
        );
    }

    #[test]
    fn rejects_unknown_type_names() {
        assert!(matches!(
            DataType::resolve("Complex128"),
            Err(TelemetryError::UnknownType { .. })
        ));
        assert!(matches!(
            DataType::resolve("String[x]"),
            Err(TelemetryError::UnknownType { .. })
        ));
    }

    #[test]
    fn int8_conversion_checks_range() {
        assert_eq!(
            DataType::Int8.convert(&Value::Float(127.0)).unwrap(),
            CanonicalValue::Float(127.0)
        );
        assert!(matches!(
            DataType::Int8.convert(&Value::Float(128.0)),
            Err(TelemetryError::Conversion { .. })
        ));
        assert!(matches!(
            DataType::Int8.convert(&Value::Int(-129)),
            Err(TelemetryError::Conversion { .. })
        ));
        assert!(matches!(
            DataType::Int8.convert(&Value::UInt(200)),
            Err(TelemetryError::Conversion { .. })
        ));
    }

    #[test]
    fn unsigned_targets_reject_negatives() {
        assert!(matches!(
            DataType::UInt16.convert(&Value::Int(-1)),
            Err(TelemetryError::Conversion { .. })
        ));
        assert_eq!(
            DataType::UInt16.convert(&Value::Int(65535)).unwrap(),
            CanonicalValue::Float(65535.0)
        );
    }

    #[test]
    fn fractional_floats_truncate_toward_zero() {
        assert_eq!(
            DataType::Int16.convert(&Value::Float(3.9)).unwrap(),
            CanonicalValue::Float(3.0)
        );
        assert_eq!(
            DataType::Int16.convert(&Value::Float(-3.9)).unwrap(),
            CanonicalValue::Float(-3.0)
        );
    }

    #[test]
    fn float32_range_is_enforced() {
        assert!(matches!(
            DataType::Float32.convert(&Value::Float(f64::MAX)),
            Err(TelemetryError::Conversion { .. })
        ));
        assert_eq!(
            DataType::Float32.convert(&Value::Float(1.5)).unwrap(),
            CanonicalValue::Float(1.5)
        );
    }

    #[test]
    fn bool_coerces_nonzero_numerics() {
        assert_eq!(
            DataType::Bool.convert(&Value::Int(0)).unwrap(),
            CanonicalValue::Bool(false)
        );
        assert_eq!(
            DataType::Bool.convert(&Value::Float(0.5)).unwrap(),
            CanonicalValue::Bool(true)
        );
        assert!(DataType::Bool.convert(&Value::Text("on".into())).is_err());
    }

    #[test]
    fn string_target_renders_numerics() {
        assert_eq!(
            DataType::String.convert(&Value::Int(42)).unwrap(),
            CanonicalValue::Text("42".to_string())
        );
        assert_eq!(
            DataType::String
                .convert(&Value::Bytes(b"abc".to_vec()))
                .unwrap(),
            CanonicalValue::Text("abc".to_string())
        );
    }

    #[test]
    fn word_packs_little_endian() {
        let packed = DataType::Word.convert(&Value::UInt(0x1234)).unwrap();
        assert_eq!(packed.kind(), CanonicalKind::Bytes);
        assert_eq!(packed, CanonicalValue::Bytes(vec![0x34, 0x12]));
        assert_eq!(
            DataType::DWord.convert(&Value::UInt(0x0102_0304)).unwrap(),
            CanonicalValue::Bytes(vec![0x04, 0x03, 0x02, 0x01])
        );
    }

    #[test]
    fn packing_validates_width() {
        assert!(matches!(
            DataType::Byte.convert(&Value::UInt(256)),
            Err(TelemetryError::Conversion { .. })
        ));
        assert!(matches!(
            DataType::Word.convert(&Value::Bytes(vec![1, 2, 3])),
            Err(TelemetryError::Conversion { .. })
        ));
        // Shorter sources zero-pad to the declared width.
        assert_eq!(
            DataType::DWord.convert(&Value::Bytes(vec![0xFF])).unwrap(),
            CanonicalValue::Bytes(vec![0xFF, 0, 0, 0])
        );
    }

    #[test]
    fn word_accepts_floats_in_range() {
        assert_eq!(
            DataType::Word.convert(&Value::Float(258.7)).unwrap(),
            CanonicalValue::Bytes(vec![0x02, 0x01])
        );
        assert!(DataType::Word.convert(&Value::Float(-1.0)).is_err());
        assert!(DataType::Word.convert(&Value::Float(70_000.0)).is_err());
    }

    #[test]
    fn convert_then_canonicalize_round_trips() {
        // Numeric: convert then to_f64 equals converting directly.
        let converted = DataType::Int32.convert(&Value::Int(1234)).unwrap();
        assert_eq!(to_f64(&Value::from(converted)).unwrap(), 1234.0);

        // Byte-packed: convert then to_bytes is byte-for-byte stable.
        let packed = DataType::Word.convert(&Value::UInt(0xBEEF)).unwrap();
        let bytes = to_bytes(&Value::from(packed.clone())).unwrap();
        assert_eq!(CanonicalValue::Bytes(bytes), packed);
    }

    #[test]
    fn canonicalization_rejects_unsupported_inputs() {
        assert!(matches!(
            to_f64(&Value::Text("1.0".into())),
            Err(TelemetryError::UnsupportedType { .. })
        ));
        assert!(matches!(
            to_bytes(&Value::Float(1.0)),
            Err(TelemetryError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn json_values_map_onto_dynamic_values() {
        let v: Value = (&serde_json::json!(3.5)).try_into().unwrap();
        assert_eq!(v, Value::Float(3.5));
        let v: Value = (&serde_json::json!([1, 2, 255])).try_into().unwrap();
        assert_eq!(v, Value::Bytes(vec![1, 2, 255]));
        let res: TelemetryResult<Value> = (&serde_json::json!(null)).try_into();
        assert!(res.is_err());
    }

    #[test]
    fn sample_values_convert_into_their_own_type() {
        for name in ["Bool", "Byte", "Word", "DWord", "Int8", "UInt16", "Float64", "String"] {
            let (dt, _) = DataType::resolve(name).unwrap();
            let sample = dt.sample_value();
            assert!(
                dt.convert(&sample).is_ok(),
                "sample for {name} failed to convert"
            );
        }
    }
}
