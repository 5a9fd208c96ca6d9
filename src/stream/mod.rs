//! The per-partition transactional export tuple stream. See spec.md §3–§4.

mod block;
mod row;
mod sink;
mod tuple_stream;

pub use block::StreamBlock;
pub use row::{bitmap_len, decode_row, encode_row, max_row_len, ColumnType, ColumnValue, OpType, RowMetadata};
pub use sink::{ChannelSink, NullSink, PushedBlock, TopEndSink};
pub use tuple_stream::TupleStream;
