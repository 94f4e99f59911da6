use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounter, IntCounterVec, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref TRAFFIC_EVENTS_REPORTED: IntCounter = IntCounter::new(
        "apikey_traffic_events_reported_total",
        "Traffic events queued for the aggregation store"
    )
    .unwrap();
    static ref TRAFFIC_EVENTS_DROPPED: IntCounter = IntCounter::new(
        "apikey_traffic_events_dropped_total",
        "Traffic events dropped because the report queue was full or closed"
    )
    .unwrap();
    static ref TRAFFIC_WRITE_FAILURES: IntCounter = IntCounter::new(
        "apikey_traffic_write_failures_total",
        "Traffic events the aggregation store failed to record"
    )
    .unwrap();
    static ref TRAFFIC_QUEUE_DEPTH: IntGauge = IntGauge::new(
        "apikey_traffic_queue_depth",
        "Traffic events waiting for the background writer"
    )
    .unwrap();
    static ref GATE_FAIL_CLOSED: IntCounterVec = IntCounterVec::new(
        opts!(
            "apikey_gate_fail_closed_total",
            "Gate checks treated as violated because the store did not answer"
        ),
        &["check"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register traffic metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, TRAFFIC_EVENTS_REPORTED.clone());
    register(registry, TRAFFIC_EVENTS_DROPPED.clone());
    register(registry, TRAFFIC_WRITE_FAILURES.clone());
    register(registry, TRAFFIC_QUEUE_DEPTH.clone());
    register(registry, GATE_FAIL_CLOSED.clone());
}

pub(crate) fn record_reported() {
    TRAFFIC_EVENTS_REPORTED.inc();
    TRAFFIC_QUEUE_DEPTH.inc();
}

pub(crate) fn record_dropped() {
    TRAFFIC_EVENTS_DROPPED.inc();
}

pub(crate) fn record_dequeued() {
    TRAFFIC_QUEUE_DEPTH.dec();
}

pub(crate) fn record_write_failure() {
    TRAFFIC_WRITE_FAILURES.inc();
}

pub(crate) fn record_fail_closed(check: &str) {
    GATE_FAIL_CLOSED.with_label_values(&[check]).inc();
}
