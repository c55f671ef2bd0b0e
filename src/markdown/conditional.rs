//! If-None-Match handling for converted responses. Runs after a
//! `ConversionArtifact` carries an `ETag`, deciding whether the client's
//! cached copy is still valid without re-emitting the Markdown body.

use crate::config::ConditionalMode;
use http::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Client's validator matches — emit 304 with no body.
    NotModified,
    /// Client's validator doesn't match, or conditional handling isn't
    /// applicable — emit the full converted response.
    Proceed,
}

/// Evaluate `If-None-Match` against `etag` under `mode`.
///
/// - `Disabled`: always `Proceed`, regardless of headers.
/// - `ImsOnly`: spec names this mode for a `Last-Modified`/`If-Modified-Since`
///   pair this gateway never synthesizes (converted bodies have no natural
///   upstream modification time), so it behaves identically to `Disabled`.
/// - `Full`: parse `If-None-Match`, which may be `*` (matches any existing
///   representation) or a comma-separated list of quoted or unquoted
///   entity-tags. A malformed header is treated as absent — conditional
///   handling degrades to `Proceed`, never to an error.
///
/// Comparison is weak (per RFC 9110 §13.1.2 as applied to content-derived
/// tags): a leading `W/` and surrounding quotes are stripped from both sides
/// before comparing.
pub fn evaluate(mode: ConditionalMode, headers: &HeaderMap, etag: Option<&str>) -> Outcome {
    if mode != ConditionalMode::Full {
        return Outcome::Proceed;
    }

    let Some(etag) = etag else {
        return Outcome::Proceed;
    };

    let Some(raw) = headers
        .get(http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return Outcome::Proceed;
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Outcome::Proceed;
    }

    if raw == "*" {
        return Outcome::NotModified;
    }

    let target = strip_validator(etag);
    for candidate in split_entity_tags(raw) {
        if strip_validator(candidate) == target {
            return Outcome::NotModified;
        }
    }

    Outcome::Proceed
}

/// Split a comma-separated `If-None-Match` list into its tag tokens. Not a
/// full RFC 9110 grammar parser: it tolerates quoted and unquoted tokens and
/// surrounding whitespace, which covers every client this gateway expects to
/// see, and any token it can't make sense of simply won't match anything.
fn split_entity_tags(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn strip_validator(tag: &str) -> &str {
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    let tag = tag.trim();
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}
