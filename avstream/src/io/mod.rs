//! Streaming byte substrate: chunks, the rewindable chain, and the byte and
//! bit cursors that read across chunk boundaries.

pub mod bitstream;
pub mod chunk;
pub mod stream;

pub use bitstream::BitCursor;
pub use chunk::{Chunk, ChunkChain};
pub use stream::{ByteCursor, Encoding};
