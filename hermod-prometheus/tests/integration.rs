use hermod::{BackpressureStrategy, Metrics};
use hermod_prometheus::PrometheusMetrics;
use prometheus::Registry;

fn gauge_value(registry: &Registry, family: &str, label_value: &str) -> Option<f64> {
    registry
        .gather()
        .iter()
        .find(|mf| mf.name() == family)
        .and_then(|mf| mf.get_metric().iter().find(|m| m.get_label().iter().any(|l| l.value() == label_value)))
        .map(|m| if m.has_gauge() { m.get_gauge().value() } else { m.get_counter().value() })
}

#[test]
fn sink_writes_increment_the_labeled_counter() {
    let registry = Registry::new();
    let metrics = PrometheusMetrics::new(registry.clone()).unwrap();

    metrics.sink_writes_total("warehouse", 5);
    metrics.sink_writes_total("warehouse", 2);

    assert_eq!(gauge_value(&registry, "hermod_sink_writes_total", "warehouse"), Some(7.0));
}

#[test]
fn backpressure_drop_carries_sink_and_strategy_labels() {
    let registry = Registry::new();
    let metrics = PrometheusMetrics::new(registry.clone()).unwrap();

    metrics.backpressure_drop_total("warehouse", BackpressureStrategy::DropOldest, 3);

    let families = registry.gather();
    let family = families.iter().find(|f| f.name() == "hermod_backpressure_drop_total").unwrap();
    let metric = &family.get_metric()[0];
    let labels: Vec<_> = metric.get_label().iter().map(|l| (l.name(), l.value())).collect();
    assert!(labels.contains(&("sink_id", "warehouse")));
    assert!(labels.contains(&("strategy", "drop_oldest")));
    assert_eq!(metric.get_counter().value(), 3.0);
}

#[test]
fn circuit_breaker_gauge_reflects_latest_state() {
    let registry = Registry::new();
    let metrics = PrometheusMetrics::new(registry.clone()).unwrap();

    metrics.circuit_breaker_open("warehouse", true);
    assert_eq!(gauge_value(&registry, "hermod_circuit_breaker_open", "warehouse"), Some(1.0));

    metrics.circuit_breaker_open("warehouse", false);
    assert_eq!(gauge_value(&registry, "hermod_circuit_breaker_open", "warehouse"), Some(0.0));
}
