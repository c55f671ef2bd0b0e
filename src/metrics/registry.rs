use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- Describe all metrics (adds HELP / TYPE lines) ---

        // request path (ambient — every response, converted or not)
        describe_counter!(
            "gateway_http_requests_total",
            Unit::Count,
            "Total HTTP requests processed"
        );
        describe_histogram!(
            "gateway_http_request_duration_seconds",
            Unit::Seconds,
            "Total request duration from client perspective"
        );
        describe_histogram!(
            "gateway_upstream_request_duration_seconds",
            Unit::Seconds,
            "Upstream request duration (time spent waiting for upstream)"
        );
        describe_gauge!(
            "gateway_http_requests_in_flight",
            Unit::Count,
            "Number of requests currently being processed"
        );
        describe_gauge!(
            "gateway_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );

        // markdown filter: negotiation + conversion outcomes
        describe_counter!(
            "conversions_attempted",
            Unit::Count,
            "Responses for which HTML-to-Markdown conversion was attempted"
        );
        describe_counter!(
            "conversions_succeeded",
            Unit::Count,
            "Conversions that produced a markdown artifact"
        );
        describe_counter!(
            "conversions_failed",
            Unit::Count,
            "Conversions that errored at any stage"
        );
        describe_counter!(
            "conversions_bypassed",
            Unit::Count,
            "Responses skipped by negotiation, eligibility, or an unsupported codec"
        );

        // markdown filter: failure taxonomy
        describe_counter!(
            "failures_conversion",
            Unit::Count,
            "Conversion failures: malformed input the converter could not parse"
        );
        describe_counter!(
            "failures_resource_limit",
            Unit::Count,
            "Conversion failures: size or time bound exceeded"
        );
        describe_counter!(
            "failures_system",
            Unit::Count,
            "Conversion failures: allocator/converter-handle/internal errors"
        );

        // markdown filter: byte and time accounting
        describe_counter!(
            "input_bytes",
            Unit::Bytes,
            "Total decompressed HTML bytes fed to the converter"
        );
        describe_counter!(
            "output_bytes",
            Unit::Bytes,
            "Total markdown bytes produced by the converter"
        );
        describe_counter!(
            "conversion_time_sum_ms",
            Unit::Milliseconds,
            "Cumulative time spent inside the conversion engine"
        );

        // markdown filter: decompression
        describe_counter!(
            "decompressions_attempted",
            Unit::Count,
            "Upstream bodies for which decompression was attempted"
        );
        describe_counter!(
            "decompressions_succeeded",
            Unit::Count,
            "Decompressions that completed within the output cap"
        );
        describe_counter!(
            "decompressions_failed",
            Unit::Count,
            "Decompressions that errored or exceeded the output cap"
        );
        describe_counter!("decompressions_gzip", Unit::Count, "Gzip decompressions performed");
        describe_counter!(
            "decompressions_deflate",
            Unit::Count,
            "Deflate decompressions performed"
        );
        describe_counter!(
            "decompressions_brotli",
            Unit::Count,
            "Brotli decompressions performed"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
