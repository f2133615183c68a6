//! Argument codecs (spec.md §4.8): a fixed set of primitive wire formats, each with a
//! one-character discriminator tag mirroring the source material's format-string dispatch.

use fibre_utils::error::{err_detail, Error, ErrorKind, Result};

/// The fixed set of argument wire formats a `RemoteFunction` descriptor can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
	I8,
	U8,
	I16,
	U16,
	I32,
	U32,
	I64,
	U64,
	F32,
	Bool,
	/// A pointer-sized opaque handle the runtime translates to/from a local object.
	ObjectRef,
}

impl FormatTag {
	/// The one-character discriminator the wire-level function descriptor carries.
	pub fn code(self) -> char {
		match self {
			Self::I8 => 'b',
			Self::U8 => 'B',
			Self::I16 => 'h',
			Self::U16 => 'H',
			Self::I32 => 'i',
			Self::U32 => 'I',
			Self::I64 => 'q',
			Self::U64 => 'Q',
			Self::F32 => 'f',
			Self::Bool => '?',
			Self::ObjectRef => 'O',
		}
	}

	pub fn from_code(code: char) -> Result<Self> {
		Ok(match code {
			'b' => Self::I8,
			'B' => Self::U8,
			'h' => Self::I16,
			'H' => Self::U16,
			'i' => Self::I32,
			'I' => Self::U32,
			'q' => Self::I64,
			'Q' => Self::U64,
			'f' => Self::F32,
			'?' => Self::Bool,
			'O' => Self::ObjectRef,
			_ => return Err(err_detail(ErrorKind::ArgumentInvalid, "unknown format tag code")),
		})
	}

	/// Encoded length in bytes.
	pub fn length(self) -> usize {
		match self {
			Self::I8 | Self::U8 | Self::Bool => 1,
			Self::I16 | Self::U16 => 2,
			Self::I32 | Self::U32 | Self::F32 => 4,
			Self::I64 | Self::U64 | Self::ObjectRef => 8,
		}
	}
}

/// A decoded argument or return value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
	I8(i8),
	U8(u8),
	I16(i16),
	U16(u16),
	I32(i32),
	U32(u32),
	I64(i64),
	U64(u64),
	F32(f32),
	Bool(bool),
	ObjectRef(u64),
}

impl Value {
	pub fn tag(&self) -> FormatTag {
		match self {
			Self::I8(_) => FormatTag::I8,
			Self::U8(_) => FormatTag::U8,
			Self::I16(_) => FormatTag::I16,
			Self::U16(_) => FormatTag::U16,
			Self::I32(_) => FormatTag::I32,
			Self::U32(_) => FormatTag::U32,
			Self::I64(_) => FormatTag::I64,
			Self::U64(_) => FormatTag::U64,
			Self::F32(_) => FormatTag::F32,
			Self::Bool(_) => FormatTag::Bool,
			Self::ObjectRef(_) => FormatTag::ObjectRef,
		}
	}

	/// Serialize in little-endian wire format, appending to `out`.
	pub fn encode(&self, out: &mut Vec<u8>) {
		match *self {
			Self::I8(v) => out.push(v as u8),
			Self::U8(v) => out.push(v),
			Self::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
			Self::Bool(v) => out.push(u8::from(v)),
			Self::ObjectRef(v) => out.extend_from_slice(&v.to_le_bytes()),
		}
	}

	/// Deserialize `bytes` as `tag`. `bytes` must be exactly `tag.length()` long.
	pub fn decode(tag: FormatTag, bytes: &[u8]) -> Result<Self> {
		if bytes.len() != tag.length() {
			return Err(err_detail(ErrorKind::ArgumentInvalid, "argument length did not match its codec"));
		}

		Ok(match tag {
			FormatTag::I8 => Self::I8(bytes[0] as i8),
			FormatTag::U8 => Self::U8(bytes[0]),
			FormatTag::I16 => Self::I16(i16::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::U16 => Self::U16(u16::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::I32 => Self::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::U32 => Self::U32(u32::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::I64 => Self::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::U64 => Self::U64(u64::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::F32 => Self::F32(f32::from_le_bytes(bytes.try_into().unwrap())),
			FormatTag::Bool => match bytes[0] {
				0 => Self::Bool(false),
				1 => Self::Bool(true),
				_ => return Err(err_detail(ErrorKind::ArgumentInvalid, "bool byte was neither 0 nor 1")),
			},
			FormatTag::ObjectRef => Self::ObjectRef(u64::from_le_bytes(bytes.try_into().unwrap())),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(value: Value) {
		let mut bytes = Vec::new();
		value.encode(&mut bytes);
		assert_eq!(bytes.len(), value.tag().length());
		assert_eq!(Value::decode(value.tag(), &bytes).unwrap(), value);
	}

	#[test]
	fn every_format_round_trips() {
		round_trip(Value::I8(-3));
		round_trip(Value::U8(200));
		round_trip(Value::I16(-1000));
		round_trip(Value::U16(50_000));
		round_trip(Value::I32(-70_000));
		round_trip(Value::U32(0x0011_2233));
		round_trip(Value::I64(i64::MIN));
		round_trip(Value::U64(u64::MAX));
		round_trip(Value::F32(1.5));
		round_trip(Value::Bool(true));
		round_trip(Value::Bool(false));
		round_trip(Value::ObjectRef(0xdead_beef));
	}

	#[test]
	fn unframed_integer_matches_the_expected_wire_bytes() {
		let mut bytes = Vec::new();
		Value::U32(0x0011_2233).encode(&mut bytes);
		assert_eq!(bytes, [0x33, 0x22, 0x11, 0x00]);
	}

	#[test]
	fn format_codes_round_trip_through_the_discriminator_char() {
		for tag in [
			FormatTag::I8,
			FormatTag::U8,
			FormatTag::I16,
			FormatTag::U16,
			FormatTag::I32,
			FormatTag::U32,
			FormatTag::I64,
			FormatTag::U64,
			FormatTag::F32,
			FormatTag::Bool,
			FormatTag::ObjectRef,
		] {
			assert_eq!(FormatTag::from_code(tag.code()).unwrap(), tag);
		}
	}

	#[test]
	fn wrong_length_is_rejected() {
		assert!(matches!(Value::decode(FormatTag::U32, &[0, 0]), Err(e) if e.kind() == ErrorKind::ArgumentInvalid));
	}
}
