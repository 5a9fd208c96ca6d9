//! The row wire format: spec.md §4.2.
//!
//! ```text
//! [ int32 row_length ][ null_bitmap ][ metadata_cols ][ user_cols ]
//! ```

use crate::err::Result;

/// The fixed metadata columns prepended to every row, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMetadata {
	pub txn_id: i64,
	pub timestamp: i64,
	pub seq_no: i64,
	pub partition_id: i64,
	pub site_id: i64,
	pub op_type: OpType,
}

/// `op_type`, encoded as `1 = INSERT, 0 = DELETE` per spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
	Delete,
	Insert,
}

impl RowMetadata {
	/// Number of metadata columns, for null-bitmap sizing.
	pub const COUNT: usize = 6;

	fn encode(&self, buf: &mut [u8]) {
		debug_assert!(buf.len() >= Self::COUNT * 8);
		buf[0..8].copy_from_slice(&self.txn_id.to_be_bytes());
		buf[8..16].copy_from_slice(&self.timestamp.to_be_bytes());
		buf[16..24].copy_from_slice(&self.seq_no.to_be_bytes());
		buf[24..32].copy_from_slice(&self.partition_id.to_be_bytes());
		buf[32..40].copy_from_slice(&self.site_id.to_be_bytes());
		let op: i64 = match self.op_type {
			OpType::Insert => 1,
			OpType::Delete => 0,
		};
		buf[40..48].copy_from_slice(&op.to_be_bytes());
	}

	fn decode(buf: &[u8]) -> Result<Self> {
		if buf.len() < Self::COUNT * 8 {
			return Err(fail!("row buffer too short for metadata columns"));
		}
		let rd = |r: std::ops::Range<usize>| i64::from_be_bytes(buf[r].try_into().unwrap());
		let op_type = match rd(40..48) {
			1 => OpType::Insert,
			0 => OpType::Delete,
			v => return Err(fail!("invalid op_type {v} in row header")),
		};
		Ok(Self {
			txn_id: rd(0..8),
			timestamp: rd(8..16),
			seq_no: rd(16..24),
			partition_id: rd(24..32),
			site_id: rd(32..40),
			op_type,
		})
	}
}

/// A single user column value.
///
/// Concrete, round-trippable encoding chosen for this crate (spec.md leaves
/// "encoded per column type by the external tuple serializer" unspecified —
/// see DESIGN.md, "Open Question resolutions").
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
	Null,
	Boolean(bool),
	BigInt(i64),
	Double(f64),
	Text(String),
	Varbinary(Vec<u8>),
}

impl ColumnValue {
	fn is_null(&self) -> bool {
		matches!(self, ColumnValue::Null)
	}

	/// Upper bound on the encoded size of this value, excluding the bitmap bit.
	fn max_encoded_len(&self) -> usize {
		match self {
			ColumnValue::Null => 0,
			ColumnValue::Boolean(_) => 1,
			ColumnValue::BigInt(_) => 8,
			ColumnValue::Double(_) => 8,
			ColumnValue::Text(s) => 4 + s.len(),
			ColumnValue::Varbinary(b) => 4 + b.len(),
		}
	}

	fn encode(&self, buf: &mut Vec<u8>) {
		match self {
			ColumnValue::Null => {}
			ColumnValue::Boolean(b) => buf.push(if *b { 1 } else { 0 }),
			ColumnValue::BigInt(v) => buf.extend_from_slice(&v.to_be_bytes()),
			ColumnValue::Double(v) => buf.extend_from_slice(&v.to_bits().to_be_bytes()),
			ColumnValue::Text(s) => {
				buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
				buf.extend_from_slice(s.as_bytes());
			}
			ColumnValue::Varbinary(b) => {
				buf.extend_from_slice(&(b.len() as u32).to_be_bytes());
				buf.extend_from_slice(b);
			}
		}
	}
}

/// One column's declared type, used to decode a [`ColumnValue`] back out of
/// the wire format (the bitmap alone cannot tell a reader what shape a
/// non-null value has).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
	Boolean,
	BigInt,
	Double,
	Text,
	Varbinary,
}

fn decode_column(ty: ColumnType, buf: &[u8], pos: &mut usize) -> Result<ColumnValue> {
	match ty {
		ColumnType::Boolean => {
			let b = *buf.get(*pos).ok_or_else(|| fail!("truncated boolean column"))?;
			*pos += 1;
			Ok(ColumnValue::Boolean(b != 0))
		}
		ColumnType::BigInt => {
			let end = *pos + 8;
			let bytes =
				buf.get(*pos..end).ok_or_else(|| fail!("truncated bigint column"))?;
			*pos = end;
			Ok(ColumnValue::BigInt(i64::from_be_bytes(bytes.try_into().unwrap())))
		}
		ColumnType::Double => {
			let end = *pos + 8;
			let bytes =
				buf.get(*pos..end).ok_or_else(|| fail!("truncated double column"))?;
			*pos = end;
			Ok(ColumnValue::Double(f64::from_bits(u64::from_be_bytes(bytes.try_into().unwrap()))))
		}
		ColumnType::Text => {
			let len = read_u32(buf, pos)? as usize;
			let end = *pos + len;
			let bytes = buf.get(*pos..end).ok_or_else(|| fail!("truncated text column"))?;
			*pos = end;
			let s = String::from_utf8(bytes.to_vec())
				.map_err(|e| fail!("invalid utf-8 in text column: {e}"))?;
			Ok(ColumnValue::Text(s))
		}
		ColumnType::Varbinary => {
			let len = read_u32(buf, pos)? as usize;
			let end = *pos + len;
			let bytes = buf.get(*pos..end).ok_or_else(|| fail!("truncated varbinary column"))?;
			*pos = end;
			Ok(ColumnValue::Varbinary(bytes.to_vec()))
		}
	}
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
	let end = *pos + 4;
	let bytes = buf.get(*pos..end).ok_or_else(|| fail!("truncated length prefix"))?;
	*pos = end;
	Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

/// Null-bitmap length in bytes for a given total column count.
pub fn bitmap_len(total_cols: usize) -> usize {
	total_cols.div_ceil(8)
}

fn set_bit(bitmap: &mut [u8], index: usize) {
	bitmap[index / 8] |= 0x80 >> (index % 8);
}

fn bit_is_set(bitmap: &[u8], index: usize) -> bool {
	bitmap[index / 8] & (0x80 >> (index % 8)) != 0
}

/// Upper bound on the wire size of a row with the given user columns,
/// including the `row_length` prefix, bitmap, and metadata columns. Used by
/// [`crate::stream::TupleStream::append_tuple`] to decide whether a row fits
/// in the current block before actually serializing it (spec.md §4.3 step 3).
pub fn max_row_len(user_cols: &[ColumnValue]) -> usize {
	let total_cols = RowMetadata::COUNT + user_cols.len();
	4 + bitmap_len(total_cols)
		+ RowMetadata::COUNT * 8
		+ user_cols.iter().map(ColumnValue::max_encoded_len).sum::<usize>()
}

/// Serializes one row into `out`, per spec.md §4.2. Returns the number of
/// bytes written.
pub fn encode_row(meta: &RowMetadata, user_cols: &[ColumnValue], out: &mut [u8]) -> Result<usize> {
	let total_cols = RowMetadata::COUNT + user_cols.len();
	let bmp_len = bitmap_len(total_cols);
	let header_len = 4 + bmp_len;
	let body_len = RowMetadata::COUNT * 8 + user_cols.iter().map(ColumnValue::max_encoded_len).sum::<usize>();
	if out.len() < header_len + body_len {
		return Err(fail!("row buffer too small: need at least {}, have {}", header_len + body_len, out.len()));
	}

	// Bitmap starts zeroed: non-null is the default (spec.md §4.2).
	let bitmap = &mut out[4..4 + bmp_len];
	bitmap.fill(0);
	for (i, col) in user_cols.iter().enumerate() {
		if col.is_null() {
			set_bit(bitmap, RowMetadata::COUNT + i);
		}
	}

	meta.encode(&mut out[header_len..header_len + RowMetadata::COUNT * 8]);

	let mut body = Vec::with_capacity(body_len - RowMetadata::COUNT * 8);
	for col in user_cols {
		col.encode(&mut body);
	}
	let user_off = header_len + RowMetadata::COUNT * 8;
	out[user_off..user_off + body.len()].copy_from_slice(&body);

	let row_len = (bmp_len + RowMetadata::COUNT * 8 + body.len()) as i32;
	out[0..4].copy_from_slice(&row_len.to_be_bytes());

	Ok(header_len + RowMetadata::COUNT * 8 + body.len())
}

/// Deserializes one row from `buf`, given the declared types of the user
/// columns (the schema is external to the wire format — spec.md §4.2, §6).
/// Returns the metadata, the user column values, and the number of bytes
/// consumed (`4 + row_length`).
pub fn decode_row(buf: &[u8], user_col_types: &[ColumnType]) -> Result<(RowMetadata, Vec<ColumnValue>, usize)> {
	if buf.len() < 4 {
		return Err(fail!("row buffer too short for row_length prefix"));
	}
	let row_len = i32::from_be_bytes(buf[0..4].try_into().unwrap());
	if row_len < 0 {
		return Err(fail!("negative row_length {row_len}"));
	}
	let row_len = row_len as usize;
	let total = 4 + row_len;
	if buf.len() < total {
		return Err(fail!("row buffer shorter than declared row_length"));
	}

	let total_cols = RowMetadata::COUNT + user_col_types.len();
	let bmp_len = bitmap_len(total_cols);
	let bitmap = &buf[4..4 + bmp_len];

	let meta_off = 4 + bmp_len;
	let meta = RowMetadata::decode(&buf[meta_off..meta_off + RowMetadata::COUNT * 8])?;

	let mut pos = meta_off + RowMetadata::COUNT * 8;
	let mut cols = Vec::with_capacity(user_col_types.len());
	for (i, ty) in user_col_types.iter().enumerate() {
		if bit_is_set(bitmap, RowMetadata::COUNT + i) {
			cols.push(ColumnValue::Null);
		} else {
			cols.push(decode_column(*ty, buf, &mut pos)?);
		}
	}

	Ok((meta, cols, total))
}
