use crate::err::Result;

/// One contiguous byte buffer in a [`crate::stream::TupleStream`]'s block
/// chain. Immutable once pushed to the sink. See spec.md §4.1.
#[non_exhaustive]
#[derive(Debug)]
pub struct StreamBlock {
	buf: Vec<u8>,
	/// USO of byte 0 of this block.
	pub base_uso: u64,
	/// Bytes written so far; always `<= capacity`.
	offset: usize,
	/// Schema epoch this block's rows were written under.
	pub generation_id: i64,
	/// Stream name attached on the first row written to this block.
	pub signature: String,
	/// Whether this is a synthesized end-of-stream marker.
	pub end_of_stream: bool,
}

impl StreamBlock {
	/// Allocates a new, empty block of the given capacity.
	pub fn new(base_uso: u64, capacity: usize) -> Self {
		Self {
			buf: vec![0u8; capacity],
			base_uso,
			offset: 0,
			generation_id: i64::MIN,
			signature: String::new(),
			end_of_stream: false,
		}
	}

	/// A zero-byte end-of-stream marker block, never pushed with live rows.
	pub fn eos_marker(base_uso: u64, generation_id: i64, signature: String) -> Self {
		Self {
			buf: Vec::new(),
			base_uso,
			offset: 0,
			generation_id,
			signature,
			end_of_stream: true,
		}
	}

	pub fn capacity(&self) -> usize {
		self.buf.len()
	}

	pub fn offset(&self) -> usize {
		self.offset
	}

	/// Bytes available for new writes.
	pub fn remaining(&self) -> usize {
		self.capacity() - self.offset
	}

	/// USO one past the last byte written to this block.
	pub fn end_uso(&self) -> u64 {
		self.base_uso + self.offset as u64
	}

	/// Mutable slice covering `[offset, capacity)`, to serialize a row into.
	pub fn mutable_tail(&mut self) -> &mut [u8] {
		&mut self.buf[self.offset..]
	}

	/// Advances `offset` by `n` bytes of data already written via
	/// [`Self::mutable_tail`]. Fails if `n` would overrun the block.
	pub fn consumed(&mut self, n: usize) -> Result<()> {
		if n > self.remaining() {
			return Err(fail!(
				"consumed {n} bytes but only {} remain in block",
				self.remaining()
			));
		}
		self.offset += n;
		Ok(())
	}

	/// Truncates this block's content so its end USO equals `mark`.
	/// Requires `base_uso <= mark <= base_uso + offset`.
	pub fn truncate_to(&mut self, mark: u64) -> Result<()> {
		if mark < self.base_uso || mark > self.end_uso() {
			return Err(fail!(
				"truncate_to({mark}) out of range for block [{}, {}]",
				self.base_uso,
				self.end_uso()
			));
		}
		self.offset = (mark - self.base_uso) as usize;
		Ok(())
	}

	/// The written prefix of this block's buffer, i.e. the bytes the sink
	/// should actually receive.
	pub fn written(&self) -> &[u8] {
		&self.buf[..self.offset]
	}

	/// Consumes this block, handing its byte buffer to the caller. Models
	/// the ownership transfer to the sink described in spec.md §9.
	pub fn into_buffer(mut self) -> Vec<u8> {
		self.buf.truncate(self.offset);
		self.buf
	}
}
