use async_trait::async_trait;

use crate::err::Result;

/// A block pushed to a [`TopEndSink`]: either a data-bearing block, or a
/// pure end-of-stream marker when `buffer` is `None` (spec.md §4.8, §6).
#[derive(Debug, Clone)]
pub struct PushedBlock {
	pub generation_id: i64,
	pub partition_id: i32,
	pub signature: String,
	pub buffer: Option<Vec<u8>>,
	pub sync: bool,
	pub end_of_stream: bool,
}

/// The external "top end" consumer of committed export blocks. Out of scope
/// per spec.md §1; this trait is the only interface this crate needs from it.
#[async_trait]
pub trait TopEndSink: Send + Sync {
	/// Takes ownership of the block described by `block`. The caller frees
	/// the metadata wrapper after this returns; the buffer, if any, moves
	/// into the sink (spec.md §4.8, §9).
	async fn push(&self, block: PushedBlock) -> Result<()>;
}

/// A sink that discards everything pushed to it. Used in tests that only
/// care about `TupleStream`'s own bookkeeping.
#[derive(Debug, Default)]
pub struct NullSink {
	pushed: std::sync::Mutex<Vec<PushedBlock>>,
}

impl NullSink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of every block pushed so far, in push order.
	pub fn pushed(&self) -> Vec<PushedBlock> {
		self.pushed.lock().expect("sink mutex poisoned").clone()
	}
}

#[async_trait]
impl TopEndSink for NullSink {
	async fn push(&self, block: PushedBlock) -> Result<()> {
		self.pushed.lock().expect("sink mutex poisoned").push(block);
		Ok(())
	}
}

/// A sink that forwards pushed blocks over a `channel` (the `async-channel`
/// crate), for wiring a [`crate::stream::TupleStream`] to an out-of-process
/// or out-of-task consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
	tx: channel::Sender<PushedBlock>,
}

impl ChannelSink {
	pub fn new(tx: channel::Sender<PushedBlock>) -> Self {
		Self {
			tx,
		}
	}
}

#[async_trait]
impl TopEndSink for ChannelSink {
	async fn push(&self, block: PushedBlock) -> Result<()> {
		self.tx.send(block).await.map_err(|e| crate::err::Error::Sink(e.to_string()))
	}
}
