//! Prepared statement packets (COM_STMT_PREPARE / EXECUTE / CLOSE).

#![allow(clippy::cast_possible_truncation)]

use mywire_core::{ProtocolError, Value};

use crate::protocol::{Command, PacketReader, PacketWriter, malformed, unexpected};
use crate::types::FieldType;

/// Decoded COM_STMT_PREPARE response header.
#[derive(Debug, Clone, Copy)]
pub struct StmtPrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

impl StmtPrepareOk {
    /// Parse the prepare OK payload: 0x00 marker, statement id, column
    /// and parameter counts, filler, warning count.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 12 {
            return Err(malformed("prepare response shorter than 12 bytes"));
        }
        let mut reader = PacketReader::new(payload);
        if reader.read_u8() != Some(0x00) {
            return Err(unexpected("prepare response does not start with 0x00"));
        }
        let statement_id = reader
            .read_u32_le()
            .ok_or_else(|| malformed("prepare response missing statement id"))?;
        let num_columns = reader
            .read_u16_le()
            .ok_or_else(|| malformed("prepare response missing column count"))?;
        let num_params = reader
            .read_u16_le()
            .ok_or_else(|| malformed("prepare response missing parameter count"))?;
        reader.skip(1);
        let warnings = reader
            .read_u16_le()
            .ok_or_else(|| malformed("prepare response missing warning count"))?;
        Ok(Self {
            statement_id,
            num_columns,
            num_params,
            warnings,
        })
    }
}

/// Build a COM_STMT_PREPARE payload.
pub fn build_stmt_prepare(sql: &str) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + sql.len());
    writer.write_u8(Command::StmtPrepare as u8);
    writer.write_bytes(sql.as_bytes());
    writer.into_bytes()
}

/// Build a COM_STMT_CLOSE payload. The server sends no reply.
pub fn build_stmt_close(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(5);
    writer.write_u8(Command::StmtClose as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Build a COM_STMT_EXECUTE payload with bound parameters.
///
/// Parameters travel in binary format: a NULL bitmap, the
/// new-params-bound flag, one 2-byte type tag per parameter, then the
/// packed non-NULL values.
pub fn build_stmt_execute(statement_id: u32, params: &[Value]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(32 + params.len() * 8);
    writer.write_u8(Command::StmtExecute as u8);
    writer.write_u32_le(statement_id);
    writer.write_u8(0); // CURSOR_TYPE_NO_CURSOR
    writer.write_u32_le(1); // iteration count, always 1

    if params.is_empty() {
        return writer.into_bytes();
    }

    let mut bitmap = vec![0u8; (params.len() + 7) / 8];
    for (i, value) in params.iter().enumerate() {
        if value.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    writer.write_bytes(&bitmap);
    writer.write_u8(1); // new params bound

    for value in params {
        let (ty, unsigned) = param_type(value);
        writer.write_u8(ty as u8);
        writer.write_u8(if unsigned { 0x80 } else { 0 });
    }
    for value in params {
        write_param_value(&mut writer, value);
    }
    writer.into_bytes()
}

fn param_type(value: &Value) -> (FieldType, bool) {
    match value {
        Value::Null => (FieldType::Null, false),
        Value::TinyInt(_) => (FieldType::Tiny, false),
        Value::SmallInt(_) => (FieldType::Short, false),
        Value::Int(_) => (FieldType::Long, false),
        Value::BigInt(_) => (FieldType::LongLong, false),
        Value::Float(_) => (FieldType::Float, false),
        Value::Double(_) => (FieldType::Double, false),
        Value::Text(_) => (FieldType::VarString, false),
        Value::Bytes(_) => (FieldType::Blob, false),
    }
}

fn write_param_value(writer: &mut PacketWriter, value: &Value) {
    match value {
        Value::Null => {}
        Value::TinyInt(v) => writer.write_u8(*v as u8),
        Value::SmallInt(v) => writer.write_u16_le(*v as u16),
        Value::Int(v) => writer.write_u32_le(*v as u32),
        Value::BigInt(v) => writer.write_u64_le(*v as u64),
        Value::Float(v) => writer.write_u32_le(v.to_bits()),
        Value::Double(v) => writer.write_u64_le(v.to_bits()),
        Value::Text(v) => writer.write_lenenc_string(v),
        Value::Bytes(v) => writer.write_lenenc_bytes(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prepare_ok() {
        let payload = [
            0x00, 0x07, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x03, 0x00,
        ];
        let ok = StmtPrepareOk::parse(&payload).unwrap();
        assert_eq!(ok.statement_id, 7);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 1);
        assert_eq!(ok.warnings, 3);
    }

    #[test]
    fn parse_prepare_ok_too_short() {
        assert!(StmtPrepareOk::parse(&[0x00, 0x07, 0x00]).is_err());
    }

    #[test]
    fn prepare_payload() {
        let payload = build_stmt_prepare("SELECT ?");
        assert_eq!(payload[0], 0x16);
        assert_eq!(&payload[1..], b"SELECT ?");
    }

    #[test]
    fn close_payload() {
        assert_eq!(build_stmt_close(7), vec![0x19, 0x07, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn execute_payload_without_params() {
        let payload = build_stmt_execute(7, &[]);
        assert_eq!(
            payload,
            vec![0x17, 0x07, 0, 0, 0, 0x00, 0x01, 0, 0, 0]
        );
    }

    #[test]
    fn execute_payload_with_params_and_null() {
        let params = vec![
            Value::Int(5),
            Value::Null,
            Value::Text("hi".to_string()),
        ];
        let payload = build_stmt_execute(9, &params);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Some(0x17));
        assert_eq!(r.read_u32_le(), Some(9));
        assert_eq!(r.read_u8(), Some(0));
        assert_eq!(r.read_u32_le(), Some(1));
        // NULL bitmap: second param
        assert_eq!(r.read_u8(), Some(0b0000_0010));
        assert_eq!(r.read_u8(), Some(1));
        // Type tags
        assert_eq!(r.read_bytes(6), Some(&[0x03, 0, 0x06, 0, 0xFD, 0][..]));
        // Values: the NULL contributes nothing
        assert_eq!(r.read_u32_le(), Some(5));
        assert_eq!(r.read_lenenc_bytes(), Some(&b"hi"[..]));
        assert!(r.is_empty());
    }
}
