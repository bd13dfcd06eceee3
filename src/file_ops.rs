//! Transfer Engine (spec.md §4.3): `put`/`get`/`put_unique`, chunked in
//! units of `copy_buffer_size`, optionally layered with ASCII CRLF
//! normalization, `MODE Z` zlib compression, and post-transfer integrity
//! verification. Progress and completion are reported through the
//! `FtpEvent` observer stream rather than a shared global map.

use crate::client::FtpClient;
use crate::compression::{ZlibChunkDecoder, ZlibChunkEncoder};
use crate::error::{FtpError, FtpResult};
use crate::events::FtpEvent;
use crate::integrity::{self, IntegrityHasher};
use crate::transfer::DataStream;
use crate::types::{DataType, HashAlgorithm, PutAction, TransferDirection, TransferProgress};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

impl FtpClient {
    // ─── put ──────────────────────────────────────────────────────────

    /// Upload from `source` to `remote_name` under the given `action`
    /// (spec.md §4.3). `source_size`, when known to the caller (e.g. a
    /// local file's length), drives `percent_complete`; pass `None` if
    /// unknown. `verify` requests post-upload integrity comparison using
    /// the server's best advertised hash algorithm.
    pub async fn put<R>(
        &mut self,
        source: &mut R,
        remote_name: &str,
        action: PutAction,
        source_size: Option<u64>,
        verify: bool,
    ) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.enter_busy()?;
        let result = self
            .put_inner(source, remote_name, action, source_size, verify)
            .await;
        self.exit_busy();
        result
    }

    async fn put_inner<R>(
        &mut self,
        source: &mut R,
        remote_name: &str,
        action: PutAction,
        source_size: Option<u64>,
        verify: bool,
    ) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let (command, resume_offset) = match action {
            PutAction::Create => ("STOR", None),
            PutAction::CreateNew => {
                if self.get_file_size_inner(remote_name).await.is_ok() {
                    return Err(FtpError::AlreadyExists {
                        path: remote_name.to_string(),
                    });
                }
                ("STOR", None)
            }
            PutAction::CreateOrAppend => ("APPE", None),
            PutAction::Resume => match self.get_file_size_inner(remote_name).await.ok() {
                Some(offset) => ("STOR", Some(offset)),
                None => ("STOR", Some(0)),
            },
            PutAction::ResumeOrCreate => match self.get_file_size_inner(remote_name).await.ok() {
                Some(offset) => ("STOR", Some(offset)),
                None => ("STOR", None),
            },
        };

        if let (Some(offset), Some(total)) = (resume_offset, source_size) {
            if offset >= total {
                return Ok(0);
            }
        }

        // The server's digest (queried post-transfer below) always covers
        // the whole remote file, not just the bytes sent this call, so a
        // resumed-and-verified upload must hash the skipped prefix too.
        // `source` is a plain `AsyncRead`, not seekable, so that prefix can
        // only be captured by hashing it as it's discarded here rather than
        // rewinding afterward.
        let hash_algorithm = if verify {
            self.features.best_hash_algorithm()
        } else {
            None
        };
        let mut hasher = hash_algorithm.map(IntegrityHasher::new);

        if let Some(offset) = resume_offset {
            if offset > 0 {
                skip_source_bytes(source, offset, hasher.as_mut()).await?;
                let resp = self.exec("REST", Some(&offset.to_string())).await?;
                if !resp.is_success() {
                    return Err(FtpError::from_response(&resp));
                }
            }
        }

        let mode = self.config.transfer_mode;
        let ds = self.open_data_channel(mode).await?;
        let resp = self.exec(command, Some(remote_name)).await?;
        if !resp.is_preliminary() {
            return Err(FtpError::from_response(&resp));
        }

        let ascii = self.config.data_type == DataType::Ascii;
        let compressing = self.compression.is_on();

        let chunk_size = self.config.copy_buffer_size.max(1);
        let mut buf = vec![0u8; chunk_size];
        let mut encoder = ZlibChunkEncoder::new();
        let mut ascii_pending_cr = false;
        let mut ds = ds;
        let started = Instant::now();
        let mut total_sent: u64 = resume_offset.unwrap_or(0);
        let data_budget = Duration::from_secs(self.config.data_timeout_sec);

        loop {
            if self.cancellation.is_cancelled() {
                drop(ds);
                self.issue_abort().await?;
                return Err(FtpError::Cancelled);
            }

            let n = match tokio::time::timeout(data_budget, source.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.abort_on_data_stall(ds).await;
                    return Err(FtpError::DataConnectionTimeout { last_response: None });
                }
            };
            if n == 0 {
                break;
            }
            if let Some(h) = hasher.as_mut() {
                h.update(&buf[..n]);
            }

            let mut wire: Vec<u8> = if ascii {
                ascii_encode_chunk(&buf[..n], &mut ascii_pending_cr)
            } else {
                buf[..n].to_vec()
            };
            if compressing {
                wire = encoder.encode_chunk(&wire)?;
            }
            match tokio::time::timeout(data_budget, write_data_stream(&mut ds, &wire)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.abort_on_data_stall(ds).await;
                    return Err(FtpError::DataConnectionTimeout { last_response: None });
                }
            }

            total_sent += n as u64;
            self.emit_progress(
                TransferDirection::Upload,
                n as u64,
                total_sent,
                source_size,
                &started,
            );
        }

        if compressing {
            let tail = encoder.finish()?;
            if !tail.is_empty() {
                write_data_stream(&mut ds, &tail).await?;
            }
        }
        shutdown_data_stream(&mut ds).await?;
        drop(ds);

        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let done = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the transfer's final response"))??;
        self.observers.emit(FtpEvent::ResponseReceived(&done));
        if !done.is_success() {
            return Err(FtpError::from_response(&done));
        }

        self.observers.emit(FtpEvent::TransferComplete {
            total_bytes: total_sent,
            bytes_per_second: rate(total_sent, &started),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        if let (Some(algorithm), Some(hasher)) = (hash_algorithm, hasher) {
            let local_digest = hasher.finalize_hex();
            let server_digest = self.query_server_hash(algorithm, remote_name).await?;
            integrity::verify(&server_digest, &local_digest)?;
        }

        Ok(total_sent)
    }

    /// `STOU` — store under a server-assigned unique name, returned
    /// alongside the byte count.
    pub async fn put_unique<R>(
        &mut self,
        source: &mut R,
        source_size: Option<u64>,
    ) -> FtpResult<(String, u64)>
    where
        R: AsyncRead + Unpin,
    {
        self.enter_busy()?;
        let result = self.put_unique_inner(source, source_size).await;
        self.exit_busy();
        result
    }

    async fn put_unique_inner<R>(
        &mut self,
        source: &mut R,
        source_size: Option<u64>,
    ) -> FtpResult<(String, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let mode = self.config.transfer_mode;
        let ds = self.open_data_channel(mode).await?;
        let resp = self.exec("STOU", None).await?;
        if !resp.is_preliminary() {
            return Err(FtpError::from_response(&resp));
        }
        let assigned_name = parse_stou_name(&resp.text);

        let ascii = self.config.data_type == DataType::Ascii;
        let compressing = self.compression.is_on();
        let chunk_size = self.config.copy_buffer_size.max(1);
        let mut buf = vec![0u8; chunk_size];
        let mut encoder = ZlibChunkEncoder::new();
        let mut ascii_pending_cr = false;
        let mut ds = ds;
        let started = Instant::now();
        let mut total_sent: u64 = 0;
        let data_budget = Duration::from_secs(self.config.data_timeout_sec);

        loop {
            if self.cancellation.is_cancelled() {
                drop(ds);
                self.issue_abort().await?;
                return Err(FtpError::Cancelled);
            }
            let n = match tokio::time::timeout(data_budget, source.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.abort_on_data_stall(ds).await;
                    return Err(FtpError::DataConnectionTimeout { last_response: None });
                }
            };
            if n == 0 {
                break;
            }
            let mut wire: Vec<u8> = if ascii {
                ascii_encode_chunk(&buf[..n], &mut ascii_pending_cr)
            } else {
                buf[..n].to_vec()
            };
            if compressing {
                wire = encoder.encode_chunk(&wire)?;
            }
            match tokio::time::timeout(data_budget, write_data_stream(&mut ds, &wire)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.abort_on_data_stall(ds).await;
                    return Err(FtpError::DataConnectionTimeout { last_response: None });
                }
            }
            total_sent += n as u64;
            self.emit_progress(
                TransferDirection::Upload,
                n as u64,
                total_sent,
                source_size,
                &started,
            );
        }
        if compressing {
            let tail = encoder.finish()?;
            if !tail.is_empty() {
                write_data_stream(&mut ds, &tail).await?;
            }
        }
        shutdown_data_stream(&mut ds).await?;
        drop(ds);

        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let done = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the transfer's final response"))??;
        self.observers.emit(FtpEvent::ResponseReceived(&done));
        if !done.is_success() {
            return Err(FtpError::from_response(&done));
        }

        self.observers.emit(FtpEvent::TransferComplete {
            total_bytes: total_sent,
            bytes_per_second: rate(total_sent, &started),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        let name = assigned_name
            .or_else(|| parse_stou_name(&done.text))
            .ok_or_else(|| {
                FtpError::protocol("STOU did not report an assigned filename", Some(done))
            })?;
        Ok((name, total_sent))
    }

    // ─── get ──────────────────────────────────────────────────────────

    /// Download `remote_name` into `sink`. When `resume` is set, the sink
    /// is seeked to its current length and a matching `REST` is sent
    /// before `RETR` (spec.md §4.3).
    pub async fn get<W>(&mut self, remote_name: &str, sink: &mut W, resume: bool) -> FtpResult<u64>
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        self.enter_busy()?;
        let result = self.get_inner(remote_name, sink, resume).await;
        self.exit_busy();
        result
    }

    async fn get_inner<W>(
        &mut self,
        remote_name: &str,
        sink: &mut W,
        resume: bool,
    ) -> FtpResult<u64>
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        let resume_offset = if resume {
            let offset = sink.seek(std::io::SeekFrom::End(0)).await?;
            if offset > 0 {
                let resp = self.exec("REST", Some(&offset.to_string())).await?;
                if !resp.is_success() {
                    return Err(FtpError::from_response(&resp));
                }
            }
            offset
        } else {
            0
        };

        let remote_size = self.get_file_size_inner(remote_name).await.ok();

        let mode = self.config.transfer_mode;
        let ds = self.open_data_channel(mode).await?;
        let resp = self.exec("RETR", Some(remote_name)).await?;
        if !resp.is_preliminary() {
            return Err(FtpError::from_response(&resp));
        }

        let ascii = self.config.data_type == DataType::Ascii;
        let compressing = self.compression.is_on();
        let chunk_size = self.config.copy_buffer_size.max(1);
        let mut buf = vec![0u8; chunk_size];
        let mut decoder = ZlibChunkDecoder::new();
        let mut ascii_pending_cr = false;
        let mut ds = ds;
        let started = Instant::now();
        let mut total_received = resume_offset;
        let data_budget = Duration::from_secs(self.config.data_timeout_sec);

        loop {
            if self.cancellation.is_cancelled() {
                drop(ds);
                self.issue_abort().await?;
                return Err(FtpError::Cancelled);
            }

            let n = match tokio::time::timeout(data_budget, read_data_stream(&mut ds, &mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.abort_on_data_stall(ds).await;
                    return Err(FtpError::DataConnectionTimeout { last_response: None });
                }
            };
            if n == 0 {
                break;
            }

            let mut plain = if compressing {
                decoder.decode_chunk(&buf[..n])?
            } else {
                buf[..n].to_vec()
            };
            if ascii {
                plain = ascii_decode_chunk(&plain, &mut ascii_pending_cr);
            }
            sink.write_all(&plain).await?;

            total_received += n as u64;
            self.emit_progress(
                TransferDirection::Download,
                n as u64,
                total_received,
                remote_size,
                &started,
            );
        }

        if ascii_pending_cr {
            sink.write_all(b"\r").await?;
        }
        sink.flush().await?;
        drop(ds);

        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let done = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the transfer's final response"))??;
        self.observers.emit(FtpEvent::ResponseReceived(&done));
        if !done.is_success() {
            return Err(FtpError::from_response(&done));
        }

        self.observers.emit(FtpEvent::TransferComplete {
            total_bytes: total_received,
            bytes_per_second: rate(total_received, &started),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        Ok(total_received)
    }

    // ─── helpers ────────────────────────────────────────────────────

    fn emit_progress(
        &self,
        direction: TransferDirection,
        bytes_in_last_chunk: u64,
        total_bytes: u64,
        transfer_size: Option<u64>,
        started: &Instant,
    ) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let progress = TransferProgress {
            direction,
            bytes_in_last_chunk,
            total_bytes,
            transfer_size,
            bytes_per_second: rate(total_bytes, started),
            elapsed_ms,
            percent_complete: transfer_size.map(|size| {
                if size == 0 {
                    100.0
                } else {
                    (total_bytes as f64 / size as f64 * 100.0) as f32
                }
            }),
        };
        self.observers.emit(FtpEvent::TransferProgress(&progress));
    }

    /// Query the server's reported digest for `remote_name` using the
    /// best advertised command for `algorithm` (`HASH`, else the matching
    /// `X*` extension). The digest is the first hex token of matching
    /// length found in the reply text.
    async fn query_server_hash(
        &mut self,
        algorithm: HashAlgorithm,
        remote_name: &str,
    ) -> FtpResult<String> {
        let (verb, expect_len) = match algorithm {
            HashAlgorithm::Crc32 => ("XCRC", 8),
            HashAlgorithm::Md5 => ("XMD5", 32),
            HashAlgorithm::Sha1 => ("XSHA1", 40),
            HashAlgorithm::Sha256 => ("XSHA256", 64),
        };
        let verb = if self.features.supports("HASH") {
            "HASH"
        } else {
            verb
        };
        let resp = self.exec(verb, Some(remote_name)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        resp.text
            .split(|c: char| c.is_whitespace() || c == ';')
            .find(|tok| tok.len() == expect_len && tok.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_string)
            .ok_or_else(|| FtpError::protocol(format!("no digest in reply: {}", resp.text), Some(resp)))
    }

    /// Close the data channel and send `ABOR` as if the transfer had been
    /// cancelled (spec.md §5: "a timeout on the transfer channel aborts the
    /// transfer as if cancelled"). Used by the per-chunk `transfer_timeout`
    /// checks below.
    async fn abort_on_data_stall(&mut self, ds: DataStream) {
        drop(ds);
        let _ = self.issue_abort().await;
    }
}

fn rate(total_bytes: u64, started: &Instant) -> f64 {
    let elapsed = started.elapsed().as_secs_f64().max(0.001);
    total_bytes as f64 / elapsed
}

/// Discard the first `offset` bytes of a non-seekable `source` ahead of a
/// resumed upload, feeding them through `hasher` (when verification is
/// requested) so the running digest still covers the whole file rather
/// than just the bytes actually sent on the wire this call.
async fn skip_source_bytes<R: AsyncRead + Unpin>(
    source: &mut R,
    mut offset: u64,
    mut hasher: Option<&mut IntegrityHasher>,
) -> FtpResult<()> {
    let mut discard = vec![0u8; 8192];
    while offset > 0 {
        let take = discard.len().min(offset as usize);
        let n = source.read(&mut discard[..take]).await?;
        if n == 0 {
            break;
        }
        if let Some(h) = hasher.as_mut() {
            h.update(&discard[..n]);
        }
        offset -= n as u64;
    }
    Ok(())
}

async fn read_data_stream(ds: &mut DataStream, buf: &mut [u8]) -> FtpResult<usize> {
    let n = match ds {
        DataStream::Plain(tcp) => tcp.read(buf).await?,
        DataStream::Tls(tls) => tls.read(buf).await?,
    };
    Ok(n)
}

async fn write_data_stream(ds: &mut DataStream, buf: &[u8]) -> FtpResult<()> {
    match ds {
        DataStream::Plain(tcp) => tcp.write_all(buf).await?,
        DataStream::Tls(tls) => tls.write_all(buf).await?,
    }
    Ok(())
}

async fn shutdown_data_stream(ds: &mut DataStream) -> FtpResult<()> {
    match ds {
        DataStream::Plain(tcp) => {
            tcp.flush().await?;
            tcp.shutdown().await?;
        }
        DataStream::Tls(tls) => {
            tls.flush().await?;
            tls.shutdown().await?;
        }
    }
    Ok(())
}

/// Parse the server-assigned filename out of a `STOU` 150/226 reply,
/// e.g. `150 FILE: uniq.txt` or `226 Transfer complete (unique-id.3)`.
fn parse_stou_name(text: &str) -> Option<String> {
    if let Some(idx) = text.find("FILE:") {
        return Some(text[idx + 5..].trim().split_whitespace().next()?.to_string());
    }
    if let (Some(open), Some(close)) = (text.find('('), text.find(')')) {
        if close > open {
            return Some(text[open + 1..close].trim().to_string());
        }
    }
    None
}

/// Insert `\r` before any `\n` not already preceded by one, carrying
/// trailing-CR state across chunk boundaries.
fn ascii_encode_chunk(input: &[u8], pending_cr: &mut bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 32 + 1);
    for &b in input {
        if b == b'\n' && !*pending_cr {
            out.push(b'\r');
        }
        out.push(b);
        *pending_cr = b == b'\r';
    }
    out
}

/// Strip a `\r` immediately preceding `\n`, carrying a trailing lone `\r`
/// across chunk boundaries until it's known whether a `\n` follows.
fn ascii_decode_chunk(input: &[u8], pending_cr: &mut bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        match (*pending_cr, b) {
            (true, b'\n') => {
                out.push(b'\n');
                *pending_cr = false;
            }
            (true, b'\r') => {
                out.push(b'\r');
            }
            (true, _) => {
                out.push(b'\r');
                out.push(b);
                *pending_cr = false;
            }
            (false, b'\r') => {
                *pending_cr = true;
            }
            (false, _) => {
                out.push(b);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trip_across_chunk_boundary() {
        let original = b"line one\nline two\r\nline three\n";

        let mut encode_pending = false;
        let mut wire = Vec::new();
        wire.extend(ascii_encode_chunk(&original[..10], &mut encode_pending));
        wire.extend(ascii_encode_chunk(&original[10..], &mut encode_pending));

        let mut decode_pending = false;
        let mut back = Vec::new();
        back.extend(ascii_decode_chunk(&wire[..7], &mut decode_pending));
        back.extend(ascii_decode_chunk(&wire[7..], &mut decode_pending));
        if decode_pending {
            back.push(b'\r');
        }

        assert_eq!(back, original);
    }

    #[test]
    fn ascii_decode_preserves_lone_trailing_cr() {
        let mut pending = false;
        let out = ascii_decode_chunk(b"abc\r", &mut pending);
        assert_eq!(out, b"abc");
        assert!(pending);
    }

    #[test]
    fn stou_name_parses_file_colon_form() {
        assert_eq!(
            parse_stou_name("150 FILE: uniq.42.txt"),
            Some("uniq.42.txt".to_string())
        );
    }

    #[test]
    fn stou_name_parses_parenthesized_form() {
        assert_eq!(
            parse_stou_name("226 Transfer complete (unique-id.3)"),
            Some("unique-id.3".to_string())
        );
    }
}
