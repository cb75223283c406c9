//! Integration test for hermod-otlp against a real OTLP collector.

use hermod::Metrics;
use hermod_otlp::OtlpMetrics;
use opentelemetry_otlp::WithExportConfig;
use std::time::Duration;

// Requires an OTLP collector listening on HTTP. If HERMOD_TEST_OTLP_ENDPOINT is unset, skip.
#[tokio::test]
async fn publishes_metrics_to_otlp() {
    let endpoint = match std::env::var("HERMOD_TEST_OTLP_ENDPOINT") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("skipping: set HERMOD_TEST_OTLP_ENDPOINT (e.g. http://127.0.0.1:4318)");
            return;
        }
    };

    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(5))
        .build()
        .expect("build otlp exporter");

    let processor = opentelemetry_sdk::logs::BatchLogProcessor::builder(exporter)
        .with_batch_config(
            opentelemetry_sdk::logs::BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_millis(200))
                .build(),
        )
        .build();

    let provider =
        opentelemetry_sdk::logs::SdkLoggerProvider::builder().with_log_processor(processor).build();

    let metrics = OtlpMetrics::new(provider.clone());
    metrics.sink_writes_total("warehouse", 3);
    metrics.circuit_breaker_open("warehouse", true);

    provider.force_flush().unwrap();
    provider.shutdown().unwrap();
}
