use std::collections::VecDeque;

use crate::err::{Error, Result};
use crate::stream::block::StreamBlock;
use crate::stream::row::{self, ColumnValue, OpType, RowMetadata};
use crate::stream::sink::{PushedBlock, TopEndSink};

const TARGET: &str = "streamdb::stream::tuple_stream";

/// Sentinel for "no transaction has opened yet" / "generation not yet set".
/// See spec.md §9, "Generation sentinel".
const SENTINEL: i64 = i64::MIN;

/// The per-partition buffer-chain manager: owns one in-progress block and a
/// FIFO of blocks pending commit+handoff, and tracks USO, transaction
/// boundaries and generation. See spec.md §3–§4.
#[non_exhaustive]
pub struct TupleStream {
	partition_id: i32,
	site_id: i64,

	uso: u64,
	current_block: Option<StreamBlock>,
	pending: VecDeque<StreamBlock>,

	open_txn_id: i64,
	committed_txn_id: i64,
	committed_uso: u64,

	generation: i64,
	prev_block_generation: i64,

	signature: String,
	last_flush_millis: i64,
	default_capacity: usize,
}

impl TupleStream {
	/// Creates a stream with an initial empty block, per spec.md §3
	/// "Lifecycle".
	pub fn new(partition_id: i32, site_id: i64) -> Self {
		let default_capacity = *crate::cnf::DEFAULT_BLOCK_CAPACITY;
		Self {
			partition_id,
			site_id,
			uso: 0,
			current_block: Some(StreamBlock::new(0, default_capacity)),
			pending: VecDeque::new(),
			open_txn_id: SENTINEL,
			committed_txn_id: SENTINEL,
			committed_uso: 0,
			generation: SENTINEL,
			prev_block_generation: SENTINEL,
			signature: String::new(),
			last_flush_millis: 0,
			default_capacity,
		}
	}

	pub fn uso(&self) -> u64 {
		self.uso
	}

	pub fn committed_uso(&self) -> u64 {
		self.committed_uso
	}

	pub fn committed_txn_id(&self) -> i64 {
		self.committed_txn_id
	}

	pub fn open_txn_id(&self) -> i64 {
		self.open_txn_id
	}

	pub fn generation(&self) -> i64 {
		self.generation
	}

	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	pub fn current_block_offset(&self) -> usize {
		self.current_block.as_ref().map(|b| b.offset()).unwrap_or(0)
	}

	/// Only valid before any writes or any transaction has opened. See
	/// spec.md §6.
	pub fn set_default_capacity(&mut self, n: usize) -> Result<()> {
		let started = self.open_txn_id != SENTINEL || self.uso != 0;
		if started {
			return Err(fail!(
				"cannot change default capacity after writes have started or a transaction has opened"
			));
		}
		self.default_capacity = n;
		// The initial block is still untouched; resize it too so the first
		// append sees the new capacity rather than the construction-time one.
		if let Some(cur) = &self.current_block {
			if cur.offset() == 0 {
				self.current_block = Some(StreamBlock::new(cur.base_uso, n));
			}
		}
		Ok(())
	}

	/// `gen` must strictly increase; `sig` must match the current signature
	/// or the current signature must still be empty. See spec.md §6.
	pub async fn set_signature_and_generation<S: TopEndSink + ?Sized>(
		&mut self,
		sig: String,
		gen: i64,
		sink: &S,
	) -> Result<()> {
		if gen <= self.generation {
			return Err(fail!(
				"generation must strictly increase: current={}, requested={gen}",
				self.generation
			));
		}
		if !self.signature.is_empty() && self.signature != sig {
			return Err(fail!(
				"signature mismatch: stream is {:?}, requested {sig:?}",
				self.signature
			));
		}
		let is_initial = self.generation == SENTINEL;
		trace!(target: TARGET, sig = %sig, gen, is_initial, "setSignatureAndGeneration");
		self.signature = sig;
		self.generation = gen;
		if !is_initial {
			// Force-commit whatever is currently open under the old
			// generation, then fence the chain so no block straddles the
			// epoch boundary.
			self.committed_uso = self.uso;
			self.committed_txn_id = self.open_txn_id;
			self.force_new_block();
			self.drain_pending_blocks(sink).await?;
		}
		Ok(())
	}

	/// spec.md §4.4.
	pub fn commit(&mut self, last_committed_txn_id: i64, current_txn_id: i64, _sync: bool) -> Result<()> {
		if current_txn_id < self.open_txn_id {
			return Err(fail!(
				"txn_id regression: open={}, current={current_txn_id}",
				self.open_txn_id
			));
		}
		if current_txn_id == self.open_txn_id && last_committed_txn_id == self.committed_txn_id {
			return Ok(());
		}
		if self.open_txn_id < current_txn_id {
			self.committed_uso = self.uso;
			self.committed_txn_id = self.open_txn_id;
			self.open_txn_id = current_txn_id;
		}
		if self.open_txn_id <= last_committed_txn_id {
			self.committed_uso = self.uso;
			self.committed_txn_id = self.open_txn_id;
		}
		Ok(())
	}

	/// spec.md §4.3. Returns the pre-append USO, i.e. the mark a caller
	/// passes to [`Self::rollback_to`] to undo this append.
	#[allow(clippy::too_many_arguments)]
	pub async fn append_tuple<S: TopEndSink + ?Sized>(
		&mut self,
		last_committed_txn_id: i64,
		txn_id: i64,
		seq_no: i64,
		timestamp: i64,
		generation_id: i64,
		user_cols: &[ColumnValue],
		op_type: OpType,
		sink: &S,
	) -> Result<u64> {
		if txn_id < self.open_txn_id {
			return Err(fail!("txn_id regression: open={}, current={txn_id}", self.open_txn_id));
		}
		let mark = self.uso;

		self.commit(last_committed_txn_id, txn_id, false)?;

		let max_len = row::max_row_len(user_cols);

		let mut force_new = false;
		if generation_id > self.generation {
			self.generation = generation_id;
			force_new = true;
		}

		let needs_new_block = force_new
			|| self.current_block.is_none()
			|| max_len > self.current_block.as_ref().unwrap().remaining();
		if needs_new_block {
			if max_len > self.default_capacity {
				return Err(fail!(
					"row of at most {max_len} bytes exceeds default block capacity {}",
					self.default_capacity
				));
			}
			self.force_new_block();
		}

		self.drain_pending_blocks(sink).await?;

		let block = self.current_block.as_mut().expect("force_new_block always sets current_block");
		if block.offset() == 0 {
			block.generation_id = generation_id;
			block.signature = self.signature.clone();
		}

		let meta = RowMetadata {
			txn_id,
			timestamp,
			seq_no,
			partition_id: self.partition_id as i64,
			site_id: self.site_id,
			op_type,
		};
		let written = row::encode_row(&meta, user_cols, block.mutable_tail())?;
		block.consumed(written)?;
		self.uso += written as u64;

		trace!(target: TARGET, txn_id, mark, written, uso = self.uso, "appendTuple");
		Ok(mark)
	}

	/// spec.md §4.5. Discards all bytes with USO >= `mark`.
	pub fn rollback_to(&mut self, mark: u64) -> Result<()> {
		if mark > self.uso {
			return Err(fail!("rollback_to({mark}) would truncate the future: uso={}", self.uso));
		}
		self.uso = mark;

		if let Some(cur) = &mut self.current_block {
			if cur.base_uso < mark {
				cur.truncate_to(mark)?;
				return Ok(());
			}
		}

		self.current_block = None;
		while let Some(mut b) = self.pending.pop_back() {
			if b.base_uso >= mark {
				continue;
			}
			b.truncate_to(mark)?;
			self.current_block = Some(b);
			break;
		}
		Ok(())
	}

	/// spec.md §4.7.
	pub async fn periodic_flush<S: TopEndSink + ?Sized>(
		&mut self,
		now_ms: i64,
		last_committed_txn_id: i64,
		current_txn_id: i64,
		sink: &S,
	) -> Result<()> {
		let mandatory = now_ms < 0;
		let aged_out = !mandatory && now_ms - self.last_flush_millis > *crate::cnf::MAX_BUFFER_AGE_MS;
		if !(mandatory || aged_out) {
			return Ok(());
		}
		if now_ms >= 0 {
			self.last_flush_millis = now_ms;
		}
		let effective_txn = self.open_txn_id.max(current_txn_id);
		self.force_new_block();
		self.commit(last_committed_txn_id, effective_txn, false)?;
		self.drain_pending_blocks(sink).await
	}

	/// spec.md §4.6.
	pub async fn drain_pending_blocks<S: TopEndSink + ?Sized>(&mut self, sink: &S) -> Result<()> {
		loop {
			let Some(front) = self.pending.front() else {
				break;
			};
			let end_uso = front.end_uso();

			// A block nobody ever wrote a row into (e.g. the placeholder
			// `force_new_block` leaves behind when a flush or generation
			// change lands exactly on a block boundary) carries no real
			// generation — it was never stamped. Drop it without touching
			// `prev_block_generation`, or it would mask the real EOS
			// transition for the block that follows it.
			if front.offset() == 0 {
				if self.committed_uso >= end_uso {
					self.pending.pop_front();
					continue;
				}
				break;
			}

			let (base_uso, gen) = (front.base_uso, front.generation_id);
			if gen > self.prev_block_generation && self.prev_block_generation != SENTINEL {
				let eos = StreamBlock::eos_marker(base_uso, self.prev_block_generation, self.signature.clone());
				self.push_to_sink(sink, eos).await?;
			}
			self.prev_block_generation = gen;

			if self.committed_uso >= end_uso {
				let popped = self.pending.pop_front().expect("front() just returned Some");
				self.push_to_sink(sink, popped).await?;
			} else {
				break;
			}
		}
		Ok(())
	}

	/// Unconditionally moves `current_block` to `pending` (if present) and
	/// allocates a fresh one at the current tail.
	fn force_new_block(&mut self) {
		if let Some(cur) = self.current_block.take() {
			self.pending.push_back(cur);
		}
		self.current_block = Some(StreamBlock::new(self.uso, self.default_capacity));
	}

	async fn push_to_sink<S: TopEndSink + ?Sized>(&self, sink: &S, block: StreamBlock) -> Result<()> {
		if block.offset() == 0 && !block.end_of_stream {
			// Never pushed, per spec.md §4.8.
			return Ok(());
		}
		let pushed = PushedBlock {
			generation_id: block.generation_id,
			partition_id: self.partition_id,
			signature: block.signature.clone(),
			end_of_stream: block.end_of_stream,
			buffer: if block.end_of_stream && block.offset() == 0 {
				None
			} else {
				Some(block.into_buffer())
			},
			sync: false,
		};
		sink.push(pushed).await.map_err(|e| Error::Sink(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stream::row::ColumnType;
	use crate::stream::sink::NullSink;

	fn col(v: i64) -> Vec<ColumnValue> {
		vec![ColumnValue::BigInt(v)]
	}

	#[tokio::test]
	async fn s1_append_commit_drain() {
		let mut stream = TupleStream::new(7, 1);
		stream.set_default_capacity(4096).unwrap();
		let sink = NullSink::new();

		for i in 0..3 {
			stream
				.append_tuple(0, 100, i, 1_700_000_000, 0, &col(i), OpType::Insert, &sink)
				.await
				.unwrap();
		}

		stream.commit(100, 101, false).unwrap();
		assert_eq!(stream.committed_uso(), stream.uso());
		assert_eq!(sink.pushed().len(), 0);

		stream.periodic_flush(-1, 100, 101, &sink).await.unwrap();

		let pushed = sink.pushed();
		assert_eq!(pushed.len(), 1);
		assert_eq!(stream.pending_len(), 0);
		let buf = pushed[0].buffer.as_ref().unwrap();
		let types = [ColumnType::BigInt];
		let mut pos = 0usize;
		let mut rows = 0;
		while pos < buf.len() {
			let (_, cols, consumed) = row::decode_row(&buf[pos..], &types).unwrap();
			assert_eq!(cols, col(rows));
			pos += consumed;
			rows += 1;
		}
		assert_eq!(rows, 3);
	}

	#[tokio::test]
	async fn s2_rollback_mid_transaction() {
		let mut stream = TupleStream::new(1, 1);
		let sink = NullSink::new();

		let mark_a = stream
			.append_tuple(0, 5, 0, 0, 0, &col(1), OpType::Insert, &sink)
			.await
			.unwrap();
		assert_eq!(mark_a, 0);
		let mark_b = stream
			.append_tuple(0, 5, 1, 0, 0, &col(2), OpType::Insert, &sink)
			.await
			.unwrap();

		stream.rollback_to(mark_b).unwrap();
		assert_eq!(stream.uso(), mark_b);
		assert_eq!(stream.current_block_offset() as u64, mark_b);

		let mark_c = stream
			.append_tuple(0, 5, 2, 0, 0, &col(3), OpType::Insert, &sink)
			.await
			.unwrap();
		assert_eq!(mark_c, mark_b);
	}

	#[tokio::test]
	async fn s3_generation_change_emits_eos() {
		let mut stream = TupleStream::new(1, 1);
		let sink = NullSink::new();

		stream.set_signature_and_generation("sig".into(), 5, &sink).await.unwrap();
		stream
			.append_tuple(0, 1, 0, 0, 5, &col(1), OpType::Insert, &sink)
			.await
			.unwrap();
		stream.commit(1, 2, false).unwrap();
		stream.periodic_flush(-1, 1, 2, &sink).await.unwrap();

		stream.set_signature_and_generation("sig".into(), 6, &sink).await.unwrap();
		stream
			.append_tuple(2, 2, 0, 0, 6, &col(2), OpType::Insert, &sink)
			.await
			.unwrap();
		stream.commit(2, 3, false).unwrap();
		stream.periodic_flush(-1, 2, 3, &sink).await.unwrap();

		let pushed = sink.pushed();
		assert_eq!(pushed.len(), 3);
		assert_eq!(pushed[0].generation_id, 5);
		assert!(!pushed[0].end_of_stream);
		assert_eq!(pushed[1].generation_id, 5);
		assert!(pushed[1].end_of_stream);
		assert!(pushed[1].buffer.is_none());
		assert_eq!(pushed[2].generation_id, 6);
		assert!(!pushed[2].end_of_stream);
	}

	#[tokio::test]
	async fn s6_oversize_row_is_fatal() {
		let mut stream = TupleStream::new(1, 1);
		stream.set_default_capacity(64).unwrap();
		let sink = NullSink::new();

		let huge = vec![ColumnValue::Varbinary(vec![0u8; 128])];
		let before = stream.uso();
		let err = stream
			.append_tuple(0, 1, 0, 0, 0, &huge, OpType::Insert, &sink)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::Invariant(_)));
		assert_eq!(stream.uso(), before);
	}

	#[tokio::test]
	async fn s7_mandatory_flush_ignores_age() {
		let mut stream = TupleStream::new(1, 1);
		let sink = NullSink::new();
		stream
			.append_tuple(0, 1, 0, 0, 0, &col(1), OpType::Insert, &sink)
			.await
			.unwrap();
		stream.commit(1, 2, false).unwrap();
		// Never flushed before; mandatory flush must still run immediately.
		stream.periodic_flush(-1, 1, 2, &sink).await.unwrap();
		assert_eq!(sink.pushed().len(), 1);
	}

	#[test]
	fn s8_set_default_capacity_after_write_fails() {
		let mut stream = TupleStream::new(1, 1);
		stream.commit(0, 5, false).unwrap();
		assert!(stream.set_default_capacity(128).is_err());
	}

	#[tokio::test]
	async fn s8_generation_regression_fails() {
		let mut stream = TupleStream::new(1, 1);
		let sink = NullSink::new();
		stream.set_signature_and_generation("sig".into(), 5, &sink).await.unwrap();
		assert!(stream.set_signature_and_generation("sig".into(), 5, &sink).await.is_err());
		assert!(stream.set_signature_and_generation("sig".into(), 4, &sink).await.is_err());
	}
}
