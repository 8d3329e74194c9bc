use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Label value for calls that hit the wait timeout
pub const OUTCOME_TIMED_OUT: &str = "timed_out";
/// Label value for calls that ended in an internal fault
pub const OUTCOME_INTERNAL: &str = "internal";

/// Prometheus collectors shared by every adapter built with the same `Metrics`
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    pub calls_total: IntCounterVec,
    pub busy_rejections: IntCounterVec,
    pub cancel_requests: IntCounterVec,
    pub cancel_granted: IntCounterVec,
    pub in_flight: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        // Finished calls by outcome
        let calls_total = IntCounterVec::new(
            Opts::new(
                "sync_facade_calls_total",
                "Admitted operations that finished, by outcome",
            ),
            &["adapter", "outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let busy_rejections = IntCounterVec::new(
            Opts::new(
                "sync_facade_busy_rejections_total",
                "Operations rejected because another was in flight",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(busy_rejections.clone()))?;

        let cancel_requests = IntCounterVec::new(
            Opts::new(
                "sync_facade_cancel_requests_total",
                "Calls to cancel_operation",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(cancel_requests.clone()))?;

        let cancel_granted = IntCounterVec::new(
            Opts::new(
                "sync_facade_cancel_granted_total",
                "Cancellation requests that won the race",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(cancel_granted.clone()))?;

        let in_flight = IntGaugeVec::new(
            Opts::new(
                "sync_facade_in_flight",
                "1 while an operation is in flight, 0 otherwise",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            calls_total,
            busy_rejections,
            cancel_requests,
            cancel_granted,
            in_flight,
        })
    }

    /// Pre-creates the per-adapter series so they show up before the first call
    pub fn register_adapter(&self, adapter: &str) {
        self.busy_rejections.with_label_values(&[adapter]);
        self.cancel_requests.with_label_values(&[adapter]);
        self.cancel_granted.with_label_values(&[adapter]);
        self.in_flight.with_label_values(&[adapter]).set(0);
    }

    pub fn record_outcome(&self, adapter: &str, outcome: &str) {
        self.calls_total.with_label_values(&[adapter, outcome]).inc();
    }

    /// Renders the registry in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_series() {
        let metrics = Metrics::new().unwrap();
        metrics.register_adapter("billing");
        metrics.record_outcome("billing", "succeeded");
        metrics.busy_rejections.with_label_values(&["billing"]).inc();

        let text = metrics.render().unwrap();

        assert!(text.contains(r#"sync_facade_calls_total{adapter="billing",outcome="succeeded"} 1"#));
        assert!(text.contains(r#"sync_facade_busy_rejections_total{adapter="billing"} 1"#));
        assert!(text.contains(r#"sync_facade_in_flight{adapter="billing"} 0"#));
    }
}
