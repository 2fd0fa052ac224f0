use std::io::{self, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Tag recorded in recipes for the only supported digest.
pub const CHECKSUM_METHOD: &str = "sha256";

const READ_BUFFER_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = StreamingChecksum::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes SHA-256 of an entire file without holding it in memory.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = StreamingChecksum::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

// ---------------------------------------------------------------------------
// StreamingChecksum
// ---------------------------------------------------------------------------

/// Incremental SHA-256 that also counts the bytes fed into it.
#[derive(Clone, Default)]
pub struct StreamingChecksum {
    hasher: Sha256,
    bytes: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consumes the hasher and returns the lowercase hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// ChecksumWriter
// ---------------------------------------------------------------------------

/// Write adapter that hashes exactly the bytes accepted by the inner writer.
///
/// The assembler writes the rebuilt cake through this so the digest is ready
/// as soon as the last slice lands, without reading the output back.
pub struct ChecksumWriter<W> {
    inner: W,
    checksum: StreamingChecksum,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            checksum: StreamingChecksum::new(),
        }
    }

    /// Bytes written through the adapter so far.
    pub fn bytes_written(&self) -> u64 {
        self.checksum.bytes()
    }

    /// Returns the inner writer and the hex digest of everything written.
    pub fn finish(self) -> (W, String) {
        (self.inner, self.checksum.finalize())
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
