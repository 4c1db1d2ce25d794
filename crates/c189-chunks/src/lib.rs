//! c189-chunks: whole-file checksums and fixed-size chunked reads
//!
//! # Overview
//! - `checksum`: streaming MD5 digest in the uppercase hex form the server's
//!   dedup index expects (quick upload)
//! - `chunk`: chunk size selection and a lazy chunk stream that reports
//!   cumulative progress

pub mod checksum;
pub mod chunk;

pub use checksum::{checksum_bytes, file_checksum, reader_checksum};
pub use chunk::{choose_chunk_size, chunks, ChunkProgress, ChunkStream};
