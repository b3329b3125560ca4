//! Column metadata and value decoding for both result formats.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use mywire_core::{ProtocolError, Value};

use crate::protocol::{PacketReader, malformed};

/// Column type codes from column definition packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    DateTime = 0x0C,
    Year = 0x0D,
    Varchar = 0x0F,
    Bit = 0x10,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl FieldType {
    /// Map a wire type code, defaulting unknown codes to blob.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0A => Self::Date,
            0x0B => Self::Time,
            0x0C => Self::DateTime,
            0x0D => Self::Year,
            0x0F => Self::Varchar,
            0x10 => Self::Bit,
            0xF5 => Self::Json,
            0xF6 => Self::NewDecimal,
            0xF7 => Self::Enum,
            0xF8 => Self::Set,
            0xF9 => Self::TinyBlob,
            0xFA => Self::MediumBlob,
            0xFB => Self::LongBlob,
            0xFD => Self::VarString,
            0xFE => Self::String,
            0xFF => Self::Geometry,
            _ => Self::Blob,
        }
    }
}

/// Column definition flags.
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 1 << 1;
    pub const UNIQUE_KEY: u16 = 1 << 2;
    pub const BLOB: u16 = 1 << 4;
    pub const UNSIGNED: u16 = 1 << 5;
    pub const BINARY: u16 = 1 << 7;
    pub const AUTO_INCREMENT: u16 = 1 << 9;
}

/// A parsed column definition (Protocol::ColumnDefinition41).
#[derive(Debug, Clone)]
pub struct Field {
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub field_type: FieldType,
    pub flags: u16,
    pub decimals: u8,
    /// Default value, only present in COM_FIELD_LIST responses.
    pub default_value: Option<Vec<u8>>,
}

impl Field {
    /// Parse a column definition payload.
    ///
    /// `with_default` is set for COM_FIELD_LIST responses, which append a
    /// length-encoded default value after the fixed fields.
    pub fn parse(payload: &[u8], with_default: bool) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(payload);
        let catalog = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing catalog"))?;
        if catalog != "def" {
            return Err(malformed(format!(
                "column definition has unexpected catalog {catalog:?}"
            )));
        }
        let schema = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing schema"))?;
        let table = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing table"))?;
        let org_table = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing original table"))?;
        let name = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing name"))?;
        let org_name = reader
            .read_lenenc_string()
            .ok_or_else(|| malformed("column definition missing original name"))?;
        // Fixed-length block, always 0x0C
        reader
            .read_lenenc_int()
            .ok_or_else(|| malformed("column definition missing fixed-field length"))?;
        let charset = reader
            .read_u16_le()
            .ok_or_else(|| malformed("column definition missing charset"))?;
        let column_length = reader
            .read_u32_le()
            .ok_or_else(|| malformed("column definition missing column length"))?;
        let type_code = reader
            .read_u8()
            .ok_or_else(|| malformed("column definition missing type"))?;
        let flags = reader
            .read_u16_le()
            .ok_or_else(|| malformed("column definition missing flags"))?;
        let decimals = reader
            .read_u8()
            .ok_or_else(|| malformed("column definition missing decimals"))?;
        reader.skip(2);

        let default_value = if with_default && !reader.is_empty() {
            reader.read_lenenc_bytes().map(<[u8]>::to_vec)
        } else {
            None
        };

        Ok(Self {
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            field_type: FieldType::from_u8(type_code),
            flags,
            decimals,
            default_value,
        })
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Whether the column carries binary data rather than text.
    pub fn is_binary(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::Bit
                | FieldType::Geometry
        ) || (self.charset == 63
            && matches!(
                self.field_type,
                FieldType::VarString | FieldType::String | FieldType::Varchar
            ))
    }
}

/// Decode a text-format cell into a typed value.
///
/// Text rows carry every cell as a string; the column type drives the
/// conversion. Unparseable numerics fall back to text rather than
/// failing the whole row.
pub fn decode_text_value(raw: &[u8], field: &Field) -> Value {
    let text = || String::from_utf8_lossy(raw).into_owned();
    match field.field_type {
        FieldType::Tiny => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
            Some(v) => Value::TinyInt(v),
            None => Value::Text(text()),
        },
        FieldType::Short | FieldType::Year => {
            match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(v) => Value::SmallInt(v),
                None => Value::Text(text()),
            }
        }
        FieldType::Long | FieldType::Int24 => {
            match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(v) => Value::Int(v),
                None => Value::Text(text()),
            }
        }
        FieldType::LongLong => {
            match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(v) => Value::BigInt(v),
                None => Value::Text(text()),
            }
        }
        FieldType::Float => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
            Some(v) => Value::Float(v),
            None => Value::Text(text()),
        },
        FieldType::Double => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
            Some(v) => Value::Double(v),
            None => Value::Text(text()),
        },
        _ => {
            if field.is_binary() {
                Value::Bytes(raw.to_vec())
            } else {
                Value::Text(text())
            }
        }
    }
}

/// Decode a binary-format cell, consuming exactly its wire width.
///
/// Returns `None` on truncation. Unsigned integers that exceed the
/// signed range of their column type are widened into the next larger
/// variant; unsigned BIGINT values above `i64::MAX` are kept as text.
pub fn decode_binary_value(
    reader: &mut PacketReader<'_>,
    field: &Field,
) -> Option<Value> {
    let unsigned = field.is_unsigned();
    match field.field_type {
        FieldType::Null => Some(Value::Null),
        FieldType::Tiny => {
            let v = reader.read_u8()?;
            Some(if unsigned {
                Value::SmallInt(i16::from(v))
            } else {
                Value::TinyInt(v as i8)
            })
        }
        FieldType::Short | FieldType::Year => {
            let v = reader.read_u16_le()?;
            Some(if unsigned {
                Value::Int(i32::from(v))
            } else {
                Value::SmallInt(v as i16)
            })
        }
        FieldType::Long | FieldType::Int24 => {
            let v = reader.read_u32_le()?;
            Some(if unsigned {
                Value::BigInt(i64::from(v))
            } else {
                Value::Int(v as i32)
            })
        }
        FieldType::LongLong => {
            let v = reader.read_u64_le()?;
            Some(if unsigned && v > i64::MAX as u64 {
                Value::Text(v.to_string())
            } else {
                Value::BigInt(v as i64)
            })
        }
        FieldType::Float => {
            let bits = reader.read_u32_le()?;
            Some(Value::Float(f32::from_bits(bits)))
        }
        FieldType::Double => {
            let bits = reader.read_u64_le()?;
            Some(Value::Double(f64::from_bits(bits)))
        }
        FieldType::Date | FieldType::DateTime | FieldType::Timestamp => {
            decode_binary_datetime(reader, field.field_type)
        }
        FieldType::Time => decode_binary_time(reader),
        _ => {
            let raw = reader.read_lenenc_bytes()?;
            Some(if field.is_binary() {
                Value::Bytes(raw.to_vec())
            } else {
                Value::Text(String::from_utf8_lossy(raw).into_owned())
            })
        }
    }
}

/// Binary DATE/DATETIME/TIMESTAMP: 1-byte length then 0, 4, 7 or 11
/// bytes of components. Rendered as text in SQL literal format.
fn decode_binary_datetime(reader: &mut PacketReader<'_>, ty: FieldType) -> Option<Value> {
    let len = reader.read_u8()?;
    let raw = reader.read_bytes(usize::from(len))?;
    let text = match raw.len() {
        0 => {
            if ty == FieldType::Date {
                "0000-00-00".to_string()
            } else {
                "0000-00-00 00:00:00".to_string()
            }
        }
        4 => {
            let year = u16::from_le_bytes([raw[0], raw[1]]);
            let date = format!("{year:04}-{:02}-{:02}", raw[2], raw[3]);
            if ty == FieldType::Date {
                date
            } else {
                format!("{date} 00:00:00")
            }
        }
        7 | 11 => {
            let year = u16::from_le_bytes([raw[0], raw[1]]);
            let mut text = format!(
                "{year:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                raw[2], raw[3], raw[4], raw[5], raw[6]
            );
            if raw.len() == 11 {
                let micros = u32::from_le_bytes([raw[7], raw[8], raw[9], raw[10]]);
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
        _ => return None,
    };
    Some(Value::Text(text))
}

/// Binary TIME: 1-byte length then 0, 8 or 12 bytes (sign, days, h/m/s,
/// optional microseconds).
fn decode_binary_time(reader: &mut PacketReader<'_>) -> Option<Value> {
    let len = reader.read_u8()?;
    let raw = reader.read_bytes(usize::from(len))?;
    let text = match raw.len() {
        0 => "00:00:00".to_string(),
        8 | 12 => {
            let sign = if raw[0] == 1 { "-" } else { "" };
            let days = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
            let hours = u64::from(days) * 24 + u64::from(raw[5]);
            let mut text = format!("{sign}{hours:02}:{:02}:{:02}", raw[6], raw[7]);
            if raw.len() == 12 {
                let micros = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
        _ => return None,
    };
    Some(Value::Text(text))
}
