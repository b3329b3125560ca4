//! Result set decoding for the text and binary protocols.

use std::sync::Arc;

use tracing::trace;

use mywire_core::{ColumnInfo, Error, Result, Row, Value};

use crate::packet::PacketChannel;
use crate::protocol::{
    OkPacket, PacketReader, ResponseKind, classify, malformed, parse_eof, parse_err, parse_ok,
    unexpected,
};
use crate::types::{Field, decode_binary_value, decode_text_value};

/// A fully read result set.
#[derive(Debug)]
pub struct ResultSet {
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
    /// Status flags from the terminating EOF packet.
    pub status_flags: u16,
    pub warnings: u16,
}

/// Outcome of a command: either a bare OK or a result set.
#[derive(Debug)]
pub enum QueryResult {
    /// Statement produced no rows (INSERT, UPDATE, DDL, ...).
    Ok(OkPacket),
    /// Statement produced rows.
    ResultSet(ResultSet),
}

impl QueryResult {
    /// Status flags reported by the server for this exchange.
    pub fn status_flags(&self) -> u16 {
        match self {
            Self::Ok(ok) => ok.status_flags,
            Self::ResultSet(rs) => rs.status_flags,
        }
    }

    /// Rows affected, zero for result sets.
    pub fn affected_rows(&self) -> u64 {
        match self {
            Self::Ok(ok) => ok.affected_rows,
            Self::ResultSet(_) => 0,
        }
    }

    /// Last insert id, zero for result sets.
    pub fn last_insert_id(&self) -> u64 {
        match self {
            Self::Ok(ok) => ok.last_insert_id,
            Self::ResultSet(_) => 0,
        }
    }

    /// The rows, empty for bare OK results.
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Ok(_) => &[],
            Self::ResultSet(rs) => &rs.rows,
        }
    }
}

/// Read the server's response to a statement.
///
/// `binary` selects the row format: text for COM_QUERY, binary for
/// COM_STMT_EXECUTE. The first packet is either OK (no rows), ERR, or a
/// column count that opens a result set.
pub fn read_query_result(channel: &mut PacketChannel, binary: bool) -> Result<QueryResult> {
    let first = channel.read_packet()?;
    match classify(&first) {
        ResponseKind::Ok => Ok(QueryResult::Ok(parse_ok(&first).map_err(Error::Protocol)?)),
        ResponseKind::Err => Err(Error::Server(parse_err(&first).map_err(Error::Protocol)?)),
        ResponseKind::LocalInfile => Err(Error::Protocol(unexpected(
            "server requested LOCAL INFILE, which this client does not allow",
        ))),
        ResponseKind::Eof => Err(Error::Protocol(unexpected(
            "EOF packet where a result header was expected",
        ))),
        _ => {
            let mut reader = PacketReader::new(&first);
            let column_count = reader
                .read_lenenc_int()
                .ok_or_else(|| Error::Protocol(malformed("result header is not a column count")))?;
            if !reader.is_empty() {
                return Err(Error::Protocol(malformed(
                    "trailing bytes after result column count",
                )));
            }
            read_result_set(channel, column_count as usize, binary).map(QueryResult::ResultSet)
        }
    }
}

/// Read column definitions and rows after a column-count header.
fn read_result_set(
    channel: &mut PacketChannel,
    column_count: usize,
    binary: bool,
) -> Result<ResultSet> {
    let mut fields = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let payload = channel.read_packet()?;
        if classify(&payload) == ResponseKind::Err {
            return Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?));
        }
        fields.push(Field::parse(&payload, false).map_err(Error::Protocol)?);
    }

    // EOF between the column definitions and the rows
    let divider = channel.read_packet()?;
    match classify(&divider) {
        ResponseKind::Eof => {}
        ResponseKind::Err => {
            return Err(Error::Server(parse_err(&divider).map_err(Error::Protocol)?));
        }
        _ => {
            return Err(Error::Protocol(unexpected(
                "missing EOF after column definitions",
            )));
        }
    }

    let columns = Arc::new(ColumnInfo::new(
        fields.iter().map(|f| f.name.clone()).collect(),
    ));

    let mut rows = Vec::new();
    loop {
        let payload = channel.read_packet()?;
        match classify(&payload) {
            ResponseKind::Eof => {
                let eof = parse_eof(&payload).map_err(Error::Protocol)?;
                trace!(rows = rows.len(), columns = fields.len(), "result set read");
                return Ok(ResultSet {
                    fields,
                    rows,
                    status_flags: eof.status_flags,
                    warnings: eof.warnings,
                });
            }
            ResponseKind::Err => {
                return Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?));
            }
            _ => {
                let values = if binary {
                    parse_binary_row(&payload, &fields)?
                } else {
                    parse_text_row(&payload, &fields)?
                };
                rows.push(Row::with_columns(Arc::clone(&columns), values));
            }
        }
    }
}

/// Decode a text-protocol row: one length-encoded string per column,
/// with 0xFB marking NULL.
fn parse_text_row(payload: &[u8], fields: &[Field]) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        if reader.peek() == Some(0xFB) {
            reader.skip(1);
            values.push(Value::Null);
            continue;
        }
        let raw = reader.read_lenenc_bytes().ok_or_else(|| {
            Error::Protocol(malformed(format!("row truncated in column {}", field.name)))
        })?;
        values.push(decode_text_value(raw, field));
    }
    if !reader.is_empty() {
        return Err(Error::Protocol(malformed("trailing bytes after row")));
    }
    Ok(values)
}

/// Decode a binary-protocol row: 0x00 header, NULL bitmap with a 2-bit
/// offset, then packed values for the non-NULL columns.
fn parse_binary_row(payload: &[u8], fields: &[Field]) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0x00) {
        return Err(Error::Protocol(unexpected(
            "binary row does not start with 0x00",
        )));
    }
    let bitmap_len = (fields.len() + 7 + 2) / 8;
    let bitmap = reader
        .read_bytes(bitmap_len)
        .ok_or_else(|| Error::Protocol(malformed("binary row truncated in NULL bitmap")))?
        .to_vec();

    let mut values = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }
        let value = decode_binary_value(&mut reader, field).ok_or_else(|| {
            Error::Protocol(malformed(format!(
                "binary row truncated in column {}",
                field.name
            )))
        })?;
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;
    use crate::types::FieldType;

    fn field(name: &str, type_code: u8) -> Field {
        let mut w = PacketWriter::new();
        w.write_lenenc_string("def");
        w.write_lenenc_string("test");
        w.write_lenenc_string("t");
        w.write_lenenc_string("t");
        w.write_lenenc_string(name);
        w.write_lenenc_string(name);
        w.write_lenenc_int(0x0C);
        w.write_u16_le(45);
        w.write_u32_le(11);
        w.write_u8(type_code);
        w.write_u16_le(0);
        w.write_u8(0);
        w.write_zeros(2);
        Field::parse(w.as_bytes(), false).unwrap()
    }

    #[test]
    fn text_row_with_nulls() {
        let fields = vec![field("id", 0x08), field("name", 0xFD)];
        let mut w = PacketWriter::new();
        w.write_lenenc_bytes(b"42");
        w.write_u8(0xFB);
        let values = parse_text_row(w.as_bytes(), &fields).unwrap();
        assert_eq!(values, vec![Value::BigInt(42), Value::Null]);
    }

    #[test]
    fn text_row_truncated() {
        let fields = vec![field("id", 0x08), field("name", 0xFD)];
        let mut w = PacketWriter::new();
        w.write_lenenc_bytes(b"42");
        let err = parse_text_row(w.as_bytes(), &fields).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn binary_row_null_bitmap_offset() {
        let fields = vec![field("a", 0x03), field("b", 0x03), field("c", 0xFD)];
        // Column 1 (zero-based) NULL: bit index 3 in the bitmap
        let mut w = PacketWriter::new();
        w.write_u8(0x00);
        w.write_u8(0b0000_1000);
        w.write_u32_le(7);
        w.write_lenenc_bytes(b"x");
        let values = parse_binary_row(w.as_bytes(), &fields).unwrap();
        assert_eq!(
            values,
            vec![Value::Int(7), Value::Null, Value::Text("x".to_string())]
        );
        assert_eq!(fields[2].field_type, FieldType::VarString);
    }

    #[test]
    fn binary_row_bad_header() {
        let fields = vec![field("a", 0x03)];
        let err = parse_binary_row(&[0x01, 0x00], &fields).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
