//! Detects authenticated requests and rewrites `Cache-Control` on converted
//! responses so that private content is never given a shared-cache-friendly
//! directive by accident.

use http::{HeaderMap, HeaderValue};

/// `true` iff the request carries an `Authorization` header (non-empty) or a
/// cookie whose name matches one of `patterns`. Patterns support exact match,
/// a trailing-`*` prefix match, and a leading-`*` suffix match; comparisons
/// are case-sensitive on the cookie name.
pub fn is_authenticated(request_headers: &HeaderMap, patterns: &[String]) -> bool {
    let has_bearer = request_headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);

    if has_bearer {
        return true;
    }

    for cookie_header in request_headers.get_all(http::header::COOKIE) {
        let Ok(raw) = cookie_header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            let pair = pair.trim();
            let Some((name, _)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if patterns.iter().any(|p| pattern_matches(p, name)) {
                return true;
            }
        }
    }

    false
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        pattern == name
    }
}

/// Rewrite `Cache-Control` on a converted response for an authenticated
/// request. Never downgrades an existing `no-store` or `private` directive;
/// strips `public` tokens and appends `private` otherwise.
pub fn finalize_cache_control(headers: &mut HeaderMap) {
    let existing = headers
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned());

    let Some(existing) = existing else {
        headers.insert(
            http::header::CACHE_CONTROL,
            HeaderValue::from_static("private"),
        );
        return;
    };

    let tokens: Vec<&str> = existing.split(',').map(|t| t.trim()).collect();
    let has = |needle: &str| tokens.iter().any(|t| t.eq_ignore_ascii_case(needle));

    if has("no-store") || has("private") {
        return;
    }

    let new_value = if has("public") {
        let kept: Vec<&str> = tokens
            .into_iter()
            .filter(|t| !t.eq_ignore_ascii_case("public"))
            .collect();
        let mut joined = kept.join(", ");
        if joined.is_empty() {
            joined.push_str("private");
        } else {
            joined.push_str(", private");
        }
        joined
    } else {
        format!("{existing}, private")
    };

    if let Ok(v) = HeaderValue::from_str(&new_value) {
        headers.insert(http::header::CACHE_CONTROL, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        h
    }

    fn default_patterns() -> Vec<String> {
        vec![
            "session*".to_string(),
            "*session".to_string(),
            "auth_token".to_string(),
            "*_jwt".to_string(),
        ]
    }

    #[test]
    fn bearer_authorization_is_authenticated() {
        let h = headers(&[("authorization", "Bearer abc")]);
        assert!(is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn empty_authorization_is_not_authenticated() {
        let h = headers(&[("authorization", "   ")]);
        assert!(!is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn prefix_cookie_pattern_matches() {
        let h = headers(&[("cookie", "sessionid=xyz; other=1")]);
        assert!(is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn suffix_cookie_pattern_matches() {
        let h = headers(&[("cookie", "my_jwt=xyz")]);
        assert!(is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn malformed_cookie_token_contributes_nothing() {
        let h = headers(&[("cookie", "garbage-no-equals; other=1")]);
        assert!(!is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn no_match_is_unauthenticated() {
        let h = headers(&[("cookie", "theme=dark")]);
        assert!(!is_authenticated(&h, &default_patterns()));
    }

    #[test]
    fn cache_control_absent_adds_private() {
        let mut h = HeaderMap::new();
        finalize_cache_control(&mut h);
        assert_eq!(h.get(http::header::CACHE_CONTROL).unwrap(), "private");
    }

    #[test]
    fn cache_control_no_store_unchanged() {
        let mut h = headers(&[("cache-control", "no-store")]);
        finalize_cache_control(&mut h);
        assert_eq!(h.get(http::header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[test]
    fn cache_control_private_unchanged() {
        let mut h = headers(&[("cache-control", "private, max-age=0")]);
        finalize_cache_control(&mut h);
        assert_eq!(
            h.get(http::header::CACHE_CONTROL).unwrap(),
            "private, max-age=0"
        );
    }

    #[test]
    fn cache_control_public_is_replaced() {
        let mut h = headers(&[("cache-control", "public, max-age=3600")]);
        finalize_cache_control(&mut h);
        assert_eq!(
            h.get(http::header::CACHE_CONTROL).unwrap(),
            "max-age=3600, private"
        );
    }

    #[test]
    fn cache_control_other_appends_private() {
        let mut h = headers(&[("cache-control", "max-age=60")]);
        finalize_cache_control(&mut h);
        assert_eq!(h.get(http::header::CACHE_CONTROL).unwrap(), "max-age=60, private");
    }
}
