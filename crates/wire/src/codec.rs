// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Encoder and decoder for the wire layout described in the crate docs.

use prism_type::{Error, OrderedF64, Result, Timestamp, Type, Value};

use crate::frame::{Frame, FrameColumn, MessageHeader, MessageKind, Op};

const DEFINED: u8 = 1;
const UNDEFINED: u8 = 0;

/// Encode a complete message: header, columnar payload, op array.
pub fn encode_message(header: &MessageHeader, frame: &Frame) -> Result<Vec<u8>> {
	frame.validate()?;

	let mut buf = Vec::with_capacity(64 + frame.row_count() * 16);
	buf.extend_from_slice(&header.kind.to_u32().to_le_bytes());
	buf.extend_from_slice(&(header.name.len() as u32).to_le_bytes());
	buf.extend_from_slice(header.name.as_bytes());
	buf.extend_from_slice(&header.schema_version.to_le_bytes());

	encode_columns_into(&mut buf, &frame.columns)?;

	buf.extend_from_slice(&(frame.ops.len() as u32).to_le_bytes());
	for op in &frame.ops {
		buf.push(op.to_u8());
	}
	Ok(buf)
}

/// Decode a complete message.
pub fn decode_message(buf: &[u8]) -> Result<(MessageHeader, Frame)> {
	let mut reader = Reader::new(buf);

	let kind = MessageKind::from_u32(reader.u32()?)?;
	let name_len = reader.u32()? as usize;
	let name = reader.string(name_len)?;
	let schema_version = reader.u32()?;

	let columns = decode_columns_from(&mut reader)?;

	let op_count = reader.u32()? as usize;
	let mut ops = Vec::with_capacity(op_count);
	for _ in 0..op_count {
		ops.push(Op::from_u8(reader.u8()?)?);
	}
	reader.finish()?;

	let frame = Frame {
		columns,
		ops,
	};
	frame.validate()?;

	Ok((
		MessageHeader {
			kind,
			name,
			schema_version,
		},
		frame,
	))
}

/// Encode bare columns: the ingestion buffer format accepted by
/// `Table::update`.
pub fn encode_columns(columns: &[FrameColumn]) -> Result<Vec<u8>> {
	let mut buf = Vec::new();
	encode_columns_into(&mut buf, columns)?;
	Ok(buf)
}

/// Decode a bare column buffer. The whole input must be consumed.
pub fn decode_columns(buf: &[u8]) -> Result<Vec<FrameColumn>> {
	let mut reader = Reader::new(buf);
	let columns = decode_columns_from(&mut reader)?;
	reader.finish()?;
	Ok(columns)
}

fn encode_columns_into(buf: &mut Vec<u8>, columns: &[FrameColumn]) -> Result<()> {
	buf.extend_from_slice(&(columns.len() as u32).to_le_bytes());
	for column in columns {
		buf.extend_from_slice(&(column.name.len() as u32).to_le_bytes());
		buf.extend_from_slice(column.name.as_bytes());
		buf.push(column.ty.to_u8());
		buf.extend_from_slice(&(column.data.len() as u32).to_le_bytes());
		for value in &column.data {
			encode_value(buf, &column.name, column.ty, value)?;
		}
	}
	Ok(())
}

fn decode_columns_from(reader: &mut Reader<'_>) -> Result<Vec<FrameColumn>> {
	let column_count = reader.u32()? as usize;
	let mut columns = Vec::with_capacity(column_count);
	for _ in 0..column_count {
		let name_len = reader.u32()? as usize;
		let name = reader.string(name_len)?;
		let ty = Type::from_u8(reader.u8()?)?;
		let row_count = reader.u32()? as usize;
		let mut data = Vec::with_capacity(row_count);
		for _ in 0..row_count {
			data.push(decode_value(reader, ty)?);
		}
		columns.push(FrameColumn {
			name,
			ty,
			data,
		});
	}
	Ok(columns)
}

fn encode_value(buf: &mut Vec<u8>, column: &str, ty: Type, value: &Value) -> Result<()> {
	if value.is_undefined() {
		buf.push(UNDEFINED);
		return Ok(());
	}
	buf.push(DEFINED);
	match (ty, value) {
		(Type::Boolean, Value::Boolean(v)) => buf.push(*v as u8),
		(Type::Int8, Value::Int8(v)) => buf.extend_from_slice(&v.to_le_bytes()),
		(Type::Float8, Value::Float8(v)) => buf.extend_from_slice(&v.value().to_le_bytes()),
		(Type::Timestamp, Value::Timestamp(v)) => buf.extend_from_slice(&v.epoch_millis().to_le_bytes()),
		(Type::Utf8, Value::Utf8(v)) => {
			buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
			buf.extend_from_slice(v.as_bytes());
		}
		(ty, value) => {
			return Err(Error::Codec(format!(
				"column '{}' declared {} but carries {}",
				column,
				ty,
				value.get_type()
			)));
		}
	}
	Ok(())
}

fn decode_value(reader: &mut Reader<'_>, ty: Type) -> Result<Value> {
	if reader.u8()? == UNDEFINED {
		return Ok(Value::Undefined);
	}
	let value = match ty {
		Type::Boolean => Value::Boolean(reader.u8()? != 0),
		Type::Int8 => Value::Int8(reader.i64()?),
		Type::Float8 => Value::Float8(OrderedF64::new(reader.f64()?)),
		Type::Timestamp => Value::Timestamp(Timestamp(reader.i64()?)),
		Type::Utf8 => {
			let len = reader.u32()? as usize;
			Value::Utf8(reader.string(len)?)
		}
		Type::Undefined => return Err(Error::Codec("column declared with undefined type".to_string())),
	};
	Ok(value)
}

/// Bounds-checked little-endian cursor over a wire buffer.
struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			pos: 0,
		}
	}

	fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
		let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len()).ok_or_else(|| {
			Error::Codec(format!("unexpected end of buffer at offset {} (wanted {} bytes)", self.pos, len))
		})?;
		let slice = &self.buf[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn u8(&mut self) -> Result<u8> {
		Ok(self.bytes(1)?[0])
	}

	fn u32(&mut self) -> Result<u32> {
		let bytes = self.bytes(4)?;
		Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
	}

	fn i64(&mut self) -> Result<i64> {
		let mut raw = [0u8; 8];
		raw.copy_from_slice(self.bytes(8)?);
		Ok(i64::from_le_bytes(raw))
	}

	fn f64(&mut self) -> Result<f64> {
		let mut raw = [0u8; 8];
		raw.copy_from_slice(self.bytes(8)?);
		Ok(f64::from_le_bytes(raw))
	}

	fn string(&mut self, len: usize) -> Result<String> {
		let bytes = self.bytes(len)?;
		String::from_utf8(bytes.to_vec()).map_err(|_| Error::Codec("invalid utf-8 in wire string".to_string()))
	}

	/// Trailing garbage means a framing bug somewhere upstream.
	fn finish(&self) -> Result<()> {
		if self.pos != self.buf.len() {
			return Err(Error::Codec(format!(
				"{} trailing bytes after message end",
				self.buf.len() - self.pos
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_frame() -> Frame {
		Frame {
			columns: vec![
				FrameColumn::new(
					"name",
					Type::Utf8,
					vec![Value::utf8("AAPL"), Value::utf8("MSFT"), Value::Undefined],
				),
				FrameColumn::new(
					"price",
					Type::Float8,
					vec![Value::float8(173.5), Value::float8(402.25), Value::float8(-1.0)],
				),
				FrameColumn::new("volume", Type::Int8, vec![Value::Int8(100), Value::Undefined, Value::Int8(7)]),
			],
			ops: vec![Op::Insert, Op::Update, Op::Remove],
		}
	}

	#[test]
	fn test_message_round_trip() {
		let header = MessageHeader {
			kind: MessageKind::Delta,
			name: "securities/by_name".to_string(),
			schema_version: 3,
		};
		let frame = sample_frame();

		let buf = encode_message(&header, &frame).unwrap();
		let (decoded_header, decoded_frame) = decode_message(&buf).unwrap();

		assert_eq!(decoded_header, header);
		assert_eq!(decoded_frame, frame);
	}

	#[test]
	fn test_empty_payload_round_trip() {
		let header = MessageHeader {
			kind: MessageKind::SubscriberEvicted,
			name: "securities".to_string(),
			schema_version: 1,
		};
		let buf = encode_message(&header, &Frame::default()).unwrap();
		let (decoded_header, decoded_frame) = decode_message(&buf).unwrap();
		assert_eq!(decoded_header.kind, MessageKind::SubscriberEvicted);
		assert_eq!(decoded_frame.row_count(), 0);
	}

	#[test]
	fn test_columns_round_trip() {
		let columns = sample_frame().columns;
		let buf = encode_columns(&columns).unwrap();
		assert_eq!(decode_columns(&buf).unwrap(), columns);
	}

	#[test]
	fn test_truncated_buffer_is_codec_error() {
		let header = MessageHeader {
			kind: MessageKind::Snapshot,
			name: "t".to_string(),
			schema_version: 1,
		};
		let buf = encode_message(&header, &sample_frame()).unwrap();
		for cut in [1, buf.len() / 2, buf.len() - 1] {
			assert!(matches!(decode_message(&buf[..cut]), Err(Error::Codec(_))));
		}
	}

	#[test]
	fn test_trailing_bytes_rejected() {
		let header = MessageHeader {
			kind: MessageKind::Snapshot,
			name: "t".to_string(),
			schema_version: 1,
		};
		let mut buf = encode_message(&header, &Frame::default()).unwrap();
		buf.push(0xff);
		assert!(matches!(decode_message(&buf), Err(Error::Codec(_))));
	}

	#[test]
	fn test_mismatched_value_rejected_on_encode() {
		let columns = vec![FrameColumn::new("price", Type::Float8, vec![Value::utf8("oops")])];
		assert!(matches!(encode_columns(&columns), Err(Error::Codec(_))));
	}

	#[test]
	fn test_unknown_kind_rejected() {
		let mut buf = Vec::new();
		buf.extend_from_slice(&99u32.to_le_bytes());
		buf.extend_from_slice(&0u32.to_le_bytes());
		buf.extend_from_slice(&1u32.to_le_bytes());
		assert!(matches!(decode_message(&buf), Err(Error::Codec(_))));
	}
}
