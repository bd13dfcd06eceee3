//! `MODE Z` data-channel compression: a single RFC 1950 zlib stream
//! (default window) wrapping the whole transfer, incrementally fed one
//! chunk at a time as the transfer loop reads/writes.
//!
//! Grounded on the zlib wrap/unwrap used for NNTP's RFC 8054 COMPRESS
//! DEFLATE feature, adapted from `flate2`'s one-shot `Reader`/`Writer`
//! helpers to the low-level `Compress`/`Decompress` session objects so
//! state carries correctly across chunk boundaries within one transfer.

use crate::error::{FtpError, FtpResult};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Incremental zlib compressor for one transfer's worth of chunks.
pub struct ZlibChunkEncoder {
    session: Compress,
}

impl ZlibChunkEncoder {
    pub fn new() -> Self {
        Self {
            session: Compress::new(Compression::default(), true),
        }
    }

    /// Compress one chunk, returning the wire bytes produced so far.
    pub fn encode_chunk(&mut self, input: &[u8]) -> FtpResult<Vec<u8>> {
        self.run(input, FlushCompress::Sync)
    }

    /// Finalize the zlib stream at end of transfer.
    pub fn finish(&mut self) -> FtpResult<Vec<u8>> {
        self.run(&[], FlushCompress::Finish)
    }

    fn run(&mut self, input: &[u8], flush: FlushCompress) -> FtpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len().max(64));
        let mut buf = [0u8; 8192];
        let mut consumed = 0usize;
        loop {
            let before_in = self.session.total_in();
            let before_out = self.session.total_out();
            let status = self
                .session
                .compress(&input[consumed..], &mut buf, flush)
                .map_err(|e| FtpError::DataCompressionError {
                    message: e.to_string(),
                })?;
            consumed += (self.session.total_in() - before_in) as usize;
            out.extend_from_slice(&buf[..(self.session.total_out() - before_out) as usize]);
            match status {
                Status::Ok | Status::BufError if consumed < input.len() => continue,
                Status::Ok | Status::BufError => break,
                Status::StreamEnd => break,
            }
        }
        Ok(out)
    }
}

/// Incremental zlib decompressor for one transfer's worth of chunks.
pub struct ZlibChunkDecoder {
    session: Decompress,
}

impl ZlibChunkDecoder {
    pub fn new() -> Self {
        Self {
            session: Decompress::new(true),
        }
    }

    /// Decompress one chunk of wire bytes into plaintext.
    pub fn decode_chunk(&mut self, input: &[u8]) -> FtpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() * 3);
        let mut buf = [0u8; 8192];
        let mut consumed = 0usize;
        loop {
            let before_in = self.session.total_in();
            let before_out = self.session.total_out();
            let status = self
                .session
                .decompress(&input[consumed..], &mut buf, FlushDecompress::None)
                .map_err(|e| FtpError::DataCompressionError {
                    message: e.to_string(),
                })?;
            consumed += (self.session.total_in() - before_in) as usize;
            out.extend_from_slice(&buf[..(self.session.total_out() - before_out) as usize]);
            match status {
                Status::StreamEnd => break,
                _ if consumed < input.len() => continue,
                _ => break,
            }
        }
        Ok(out)
    }
}

impl Default for ZlibChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ZlibChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multi_chunk_payload() {
        let mut encoder = ZlibChunkEncoder::new();
        let mut wire = Vec::new();
        wire.extend(encoder.encode_chunk(b"hello, ").unwrap());
        wire.extend(encoder.encode_chunk(b"world!").unwrap());
        wire.extend(encoder.finish().unwrap());

        let mut decoder = ZlibChunkDecoder::new();
        let plain = decoder.decode_chunk(&wire).unwrap();
        assert_eq!(plain, b"hello, world!");
    }
}
