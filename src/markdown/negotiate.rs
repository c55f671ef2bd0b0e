//! RFC 9110 content negotiation over the `Accept` header: decides whether a
//! request wants a markdown response and, if so, whether the negotiated
//! media range actually permits it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationDecision {
    Convert,
    Skip,
}

#[derive(Debug, Clone)]
struct Entry {
    ty: String,
    subtype: String,
    q: u16, // fixed-point, 0..=1000
    specificity: u8,
    order: usize,
}

/// Parse `q=` as an integer in thousandths to avoid float comparison pitfalls.
///
/// A value that fails to parse (or isn't finite) is malformed and defaults to
/// full acceptance (`1.0`). A value that parses but falls outside `[0,1]`
/// (e.g. `q=-0.5` or `q=2`) is clamped into range rather than treated as
/// malformed — a negative q clamps down to `0.0` (reject), not up to `1.0`.
fn parse_q(raw: &str) -> u16 {
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => (v.clamp(0.0, 1.0) * 1000.0).round() as u16,
        _ => 1000,
    }
}

fn parse_entries(accept: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    for (order, part) in accept.split(',').enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut segments = part.split(';');
        let media_range = segments.next().unwrap_or("").trim();
        let Some((ty, subtype)) = media_range.split_once('/') else {
            continue;
        };
        let ty = ty.trim().to_ascii_lowercase();
        let subtype = subtype.trim().to_ascii_lowercase();
        if ty.is_empty() || subtype.is_empty() {
            continue;
        }

        let mut q = 1000u16;
        for param in segments {
            let param = param.trim();
            if let Some(v) = param.strip_prefix("q=") {
                q = parse_q(v);
            }
        }

        let specificity = if ty == "*" && subtype == "*" {
            1
        } else if subtype == "*" {
            2
        } else {
            3
        };

        entries.push(Entry {
            ty,
            subtype,
            q,
            specificity,
            order,
        });
    }
    entries
}

/// Decide whether the client wants a markdown response.
///
/// Before ranking, the full entry set is scanned for an explicit rejection
/// (`text/markdown;q=0`) — this takes priority over any wildcard match
/// elsewhere in the header. Malformed `Accept` headers (missing a
/// `/` in every range) degrade to `Skip`, never an error.
pub fn decide(accept: Option<&str>, wildcard_enabled: bool) -> NegotiationDecision {
    let Some(accept) = accept else {
        return NegotiationDecision::Skip;
    };

    let mut entries = parse_entries(accept);
    if entries.is_empty() {
        return NegotiationDecision::Skip;
    }

    let explicitly_rejected = entries
        .iter()
        .any(|e| e.ty == "text" && e.subtype == "markdown" && e.q == 0);
    if explicitly_rejected {
        return NegotiationDecision::Skip;
    }

    entries.sort_by(|a, b| {
        b.q.cmp(&a.q)
            .then(b.specificity.cmp(&a.specificity))
            .then(a.order.cmp(&b.order))
    });

    let winner = &entries[0];
    if winner.q == 0 {
        return NegotiationDecision::Skip;
    }

    let matches_markdown = (winner.ty == "text" && winner.subtype == "markdown")
        || (wildcard_enabled
            && ((winner.ty == "text" && winner.subtype == "*") || (winner.ty == "*" && winner.subtype == "*")));

    if matches_markdown {
        NegotiationDecision::Convert
    } else {
        NegotiationDecision::Skip
    }
}
