//! In-process HTML-to-Markdown conversion engine, shaped like an FFI
//! boundary (`converter_new`/`convert`/`result_free`/`converter_free`)
//! even though there's no separate native library to link against here:
//! a process-wide read-only-after-init handle, a plain options struct,
//! an owned artifact, and a tagged error enum for log/metric correlation.

use crate::config::Flavor;
use crate::markdown::failure::FailureKind;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub flavor: Flavor,
    pub timeout_ms: u64,
    pub generate_etag: bool,
    pub estimate_tokens: bool,
    pub front_matter: bool,
    pub content_type: String,
    pub base_url: Option<String>,
}

/// `{markdown, etag, token_estimate}` — the owned-Rust-value analogue of the
/// FFI artifact's `(ptr, len)` pairs. An absent field is `None`, never a
/// dangling/zero-length `Some`, so the zero-or-both invariant holds by
/// construction rather than by a runtime check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifact {
    pub markdown: String,
    pub etag: Option<String>,
    pub token_estimate: Option<u64>,
}

/// FFI-style error codes, numerically convertible for log/metric
/// correlation: `PARSE=1, ENCODING=2, TIMEOUT=3, MEMORY_LIMIT=4,
/// INVALID_INPUT=5, INTERNAL=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionError {
    Parse,
    Encoding,
    Timeout,
    MemoryLimit,
    InvalidInput,
    Internal,
}

impl ConversionError {
    pub fn code(&self) -> u8 {
        match self {
            ConversionError::Parse => 1,
            ConversionError::Encoding => 2,
            ConversionError::Timeout => 3,
            ConversionError::MemoryLimit => 4,
            ConversionError::InvalidInput => 5,
            ConversionError::Internal => 99,
        }
    }

    /// Map into the Lifecycle's three-kind failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ConversionError::Parse | ConversionError::Encoding | ConversionError::InvalidInput => {
                FailureKind::Conversion
            }
            ConversionError::Timeout | ConversionError::MemoryLimit => FailureKind::ResourceLimit,
            ConversionError::Internal => FailureKind::System,
        }
    }
}

/// Process-wide converter handle. Holds no mutable state — conversion is a
/// pure function of bytes + options — so concurrent read-only access from
/// every Tokio worker thread needs no locking; the `OnceLock` only
/// serializes the one-time construction.
pub struct ConverterHandle {
    _private: (),
}

static HANDLE: OnceLock<ConverterHandle> = OnceLock::new();

pub fn handle() -> &'static ConverterHandle {
    HANDLE.get_or_init(|| ConverterHandle { _private: () })
}

impl ConverterHandle {
    /// Convert HTML to Markdown. Runs the conversion under `timeout_ms` via
    /// `tokio::time::timeout` and catches panics from the underlying HTML
    /// parser, surfacing them as `Internal` rather than letting them cross
    /// the component boundary.
    pub async fn convert(
        &self,
        html: &[u8],
        options: &ConversionOptions,
    ) -> Result<ConversionArtifact, ConversionError> {
        let html = std::str::from_utf8(html).map_err(|_| ConversionError::Encoding)?;
        let html = html.to_owned();
        let opts = options.clone();

        let timeout = std::time::Duration::from_millis(opts.timeout_ms);
        match tokio::time::timeout(timeout, run_conversion(html, opts)).await {
            Ok(result) => result,
            Err(_) => Err(ConversionError::Timeout),
        }
    }
}

async fn run_conversion(
    html: String,
    opts: ConversionOptions,
) -> Result<ConversionArtifact, ConversionError> {
    // html2md's recursive-descent parser can panic on pathological input
    // (deeply nested or malformed trees); catch it at this boundary and
    // surface it as `Internal`, mirroring the FFI grounding's panic-catching
    // discipline even without a literal FFI call.
    let html_was_blank = html.trim().is_empty();
    let markdown = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(|| html2md::parse_html(&html))
    })
    .await
    .map_err(|_| ConversionError::Internal)?
    .map_err(|_| ConversionError::Internal)?;

    if markdown.trim().is_empty() && !html_was_blank {
        return Err(ConversionError::Parse);
    }

    let mut markdown = normalize_gfm(markdown, opts.flavor);

    if opts.front_matter {
        markdown = prepend_front_matter(&markdown, &opts);
    }

    let etag = if opts.generate_etag {
        Some(compute_etag(&markdown))
    } else {
        None
    };

    let token_estimate = if opts.estimate_tokens {
        Some(estimate_tokens(&markdown))
    } else {
        None
    };

    Ok(ConversionArtifact {
        markdown,
        etag,
        token_estimate,
    })
}

/// CommonMark has no native strikethrough syntax, but `html2md` emits
/// GFM-style `~~text~~` delimiters for `<del>`/`<s>` elements regardless of
/// requested flavor. Under `Flavor::Commonmark`, strip those delimiters
/// (keeping the enclosed text) so the output doesn't carry GFM syntax it
/// didn't ask for; under `Flavor::Gfm`, leave them as-is since GFM defines
/// `~~` as strikethrough.
fn normalize_gfm(markdown: String, flavor: Flavor) -> String {
    match flavor {
        Flavor::Gfm => markdown,
        Flavor::Commonmark => strip_strikethrough(&markdown),
    }
}

/// Removes paired `~~...~~` delimiters, keeping the enclosed text. An
/// unpaired trailing `~~` (no closing delimiter) is left untouched.
fn strip_strikethrough(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("~~") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        if let Some(end) = after_open.find("~~") {
            out.push_str(&after_open[..end]);
            rest = &after_open[end + 2..];
        } else {
            out.push_str("~~");
            rest = after_open;
        }
    }
    out.push_str(rest);
    out
}

fn prepend_front_matter(markdown: &str, opts: &ConversionOptions) -> String {
    let mut out = String::with_capacity(markdown.len() + 64);
    out.push_str("---\n");
    out.push_str("source_content_type: ");
    out.push_str(&opts.content_type);
    out.push('\n');
    if let Some(ref base) = opts.base_url {
        out.push_str("base_url: ");
        out.push_str(base);
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(markdown);
    out
}

/// Content-derived validator: a strong hash over the converted bytes, used
/// as the post-conversion `ETag`.
fn compute_etag(markdown: &str) -> String {
    let hash = blake3::hash(markdown.as_bytes());
    format!("\"{}\"", hash.to_hex())
}

/// Coarse token estimate — 4 bytes/token, the common rule of thumb for
/// English-dominant text, rounded up.
fn estimate_tokens(markdown: &str) -> u64 {
    ((markdown.len() as u64) + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ConversionOptions {
        ConversionOptions {
            flavor: Flavor::Commonmark,
            timeout_ms: 5000,
            generate_etag: true,
            estimate_tokens: false,
            front_matter: false,
            content_type: "text/html".to_string(),
            base_url: None,
        }
    }

    #[tokio::test]
    async fn converts_simple_html() {
        let artifact = handle().convert(b"<h1>Hi</h1>", &opts()).await.unwrap();
        assert!(artifact.markdown.contains("Hi"));
        assert!(artifact.etag.is_some());
    }

    #[tokio::test]
    async fn etag_omitted_when_disabled() {
        let mut o = opts();
        o.generate_etag = false;
        let artifact = handle().convert(b"<p>x</p>", &o).await.unwrap();
        assert!(artifact.etag.is_none());
    }

    #[tokio::test]
    async fn same_input_same_etag() {
        let a = handle().convert(b"<p>hello</p>", &opts()).await.unwrap();
        let b = handle().convert(b"<p>hello</p>", &opts()).await.unwrap();
        assert_eq!(a.etag, b.etag);
    }

    #[tokio::test]
    async fn invalid_utf8_is_encoding_error() {
        let err = handle().convert(&[0xff, 0xfe, 0xfd], &opts()).await.unwrap_err();
        assert_eq!(err, ConversionError::Encoding);
    }

    #[test]
    fn error_codes_match_ffi_contract() {
        assert_eq!(ConversionError::Parse.code(), 1);
        assert_eq!(ConversionError::Encoding.code(), 2);
        assert_eq!(ConversionError::Timeout.code(), 3);
        assert_eq!(ConversionError::MemoryLimit.code(), 4);
        assert_eq!(ConversionError::InvalidInput.code(), 5);
        assert_eq!(ConversionError::Internal.code(), 99);
    }

    #[test]
    fn token_estimate_is_roughly_bytes_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn commonmark_flavor_strips_strikethrough_delimiters() {
        let out = normalize_gfm("hello ~~world~~ done".to_string(), Flavor::Commonmark);
        assert_eq!(out, "hello world done");
    }

    #[test]
    fn gfm_flavor_preserves_strikethrough_delimiters() {
        let out = normalize_gfm("hello ~~world~~ done".to_string(), Flavor::Gfm);
        assert_eq!(out, "hello ~~world~~ done");
    }

    #[test]
    fn unpaired_delimiter_left_untouched() {
        let out = normalize_gfm("hello ~~world".to_string(), Flavor::Commonmark);
        assert_eq!(out, "hello ~~world");
    }
}
