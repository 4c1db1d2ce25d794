//! Whole-file content checksum used for quick upload
//!
//! The server indexes stored content by MD5, rendered as 32 uppercase hex
//! chars. Files are streamed through the digest so memory use is bounded by
//! the read buffer regardless of file size.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

const READ_BUF: usize = 64 * 1024;

/// Checksum a byte slice in memory.
pub fn checksum_bytes(data: &[u8]) -> String {
    format!("{:X}", md5::compute(data))
}

/// Checksum a file from disk using 64KB reads.
pub fn file_checksum(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening file for checksum: {}", path.display()))?;
    reader_checksum(file).with_context(|| format!("reading for checksum: {}", path.display()))
}

/// Checksum everything a reader yields until EOF.
pub fn reader_checksum<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; READ_BUF];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        ctx.consume(&buf[..n]);
    }

    Ok(format!("{:X}", ctx.compute()))
}
