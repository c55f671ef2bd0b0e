//! Detects upstream `Content-Encoding` and inflates gzip/deflate/brotli
//! bodies ahead of conversion. The codecs themselves come from
//! `async-compression`; this module only owns kind detection, the
//! output-size cap, and the `Unsupported` graceful-degradation path.

use crate::markdown::failure::FailureKind;
use async_compression::tokio::bufread::{BrotliDecoder, DeflateDecoder, GzipDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Deflate,
    Brotli,
    Unsupported,
}

/// Detect compression kind from a `Content-Encoding` header value. Empty or
/// absent is `None` — the fast path that skips this module entirely.
pub fn detect(content_encoding: Option<&str>) -> Compression {
    match content_encoding.map(str::trim) {
        None => Compression::None,
        Some(v) if v.is_empty() => Compression::None,
        Some(v) if v.eq_ignore_ascii_case("gzip") => Compression::Gzip,
        Some(v) if v.eq_ignore_ascii_case("deflate") => Compression::Deflate,
        Some(v) if v.eq_ignore_ascii_case("br") => Compression::Brotli,
        Some(_) => Compression::Unsupported,
    }
}

/// Inflate `input` under `kind`, capped at `max_out` bytes of output.
///
/// The initial read buffer is sized at `min(10 * input.len(), max_out)` to
/// avoid repeated small reads on the common case, then grown in fixed
/// windows until EOF. Exceeding `max_out` before EOF is a `resource_limit`
/// failure — this distinguishes a compression bomb from a stream that
/// simply hasn't finished yet.
pub async fn decompress(
    kind: Compression,
    input: &[u8],
    max_out: u64,
) -> Result<Vec<u8>, FailureKind> {
    debug_assert!(!matches!(kind, Compression::None | Compression::Unsupported));

    let initial_hint = ((input.len() as u64) * 10).min(max_out.max(1));
    let mut out = Vec::with_capacity(initial_hint as usize);

    let reader = BufReader::new(input);
    let result = match kind {
        Compression::Gzip => read_capped(GzipDecoder::new(reader), max_out, &mut out).await,
        Compression::Deflate => read_capped(DeflateDecoder::new(reader), max_out, &mut out).await,
        Compression::Brotli => read_capped(BrotliDecoder::new(reader), max_out, &mut out).await,
        Compression::None | Compression::Unsupported => unreachable!(),
    };

    result.map(|()| out)
}

const READ_WINDOW: usize = 64 * 1024;

async fn read_capped<R: AsyncRead + Unpin>(
    mut decoder: R,
    max_out: u64,
    out: &mut Vec<u8>,
) -> Result<(), FailureKind> {
    let mut window = [0u8; READ_WINDOW];
    loop {
        let n = decoder
            .read(&mut window)
            .await
            .map_err(|_| FailureKind::Conversion)?;
        if n == 0 {
            return Ok(());
        }
        if out.len() as u64 + n as u64 > max_out {
            return Err(FailureKind::ResourceLimit);
        }
        out.extend_from_slice(&window[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gzip_bytes(input: &[u8]) -> Vec<u8> {
        use async_compression::tokio::write::GzipEncoder;
        use tokio::io::AsyncWriteExt;
        let mut enc = GzipEncoder::new(Vec::new());
        enc.write_all(input).await.unwrap();
        enc.shutdown().await.unwrap();
        enc.into_inner()
    }

    #[test]
    fn detects_known_encodings_case_insensitively() {
        assert_eq!(detect(Some("GZIP")), Compression::Gzip);
        assert_eq!(detect(Some("deflate")), Compression::Deflate);
        assert_eq!(detect(Some("Br")), Compression::Brotli);
        assert_eq!(detect(None), Compression::None);
        assert_eq!(detect(Some("")), Compression::None);
        assert_eq!(detect(Some("compress")), Compression::Unsupported);
    }

    #[tokio::test]
    async fn gzip_round_trip_under_cap() {
        let compressed = gzip_bytes(b"<p>Hi</p>").await;
        let out = decompress(Compression::Gzip, &compressed, 1024).await.unwrap();
        assert_eq!(out, b"<p>Hi</p>");
    }

    #[tokio::test]
    async fn gzip_output_exceeding_cap_is_resource_limit() {
        let compressed = gzip_bytes(&vec![b'a'; 100_000]).await;
        let err = decompress(Compression::Gzip, &compressed, 10).await.unwrap_err();
        assert_eq!(err, FailureKind::ResourceLimit);
    }

    #[tokio::test]
    async fn truncated_stream_is_conversion_error() {
        let mut compressed = gzip_bytes(b"hello world this is a longer payload").await;
        compressed.truncate(compressed.len() - 4);
        let err = decompress(Compression::Gzip, &compressed, 1024).await.unwrap_err();
        assert_eq!(err, FailureKind::Conversion);
    }
}
