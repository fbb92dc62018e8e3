use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Lifecycle counters, incremented inside the oracle engine
    pub requests_total: IntCounter,
    pub posts_total: IntCounter,
    pub disputes_total: IntCounter,
    pub finalizations_total: IntCounter,

    // Event streaming
    pub events_emitted_total: IntCounter,

    // Gauges refreshed on scrape
    pub registered_provers: IntGauge,
    pub open_requests: IntGauge,
    pub locked_supply_veri: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounter::new(
            "veritor_requests_total",
            "Total inference requests admitted",
        )
        .unwrap();
        let posts_total =
            IntCounter::new("veritor_posts_total", "Total inference results posted").unwrap();
        let disputes_total =
            IntCounter::new("veritor_disputes_total", "Total disputes settled").unwrap();
        let finalizations_total = IntCounter::new(
            "veritor_finalizations_total",
            "Total requests finalized unchallenged",
        )
        .unwrap();

        let events_emitted_total = IntCounter::new(
            "veritor_events_emitted_total",
            "Total events emitted to subscribers",
        )
        .unwrap();

        let registered_provers =
            IntGauge::new("veritor_registered_provers", "Currently registered provers").unwrap();
        let open_requests = IntGauge::new(
            "veritor_open_requests",
            "Requests in Pending or Posted status",
        )
        .unwrap();
        let locked_supply_veri = IntGauge::new(
            "veritor_locked_supply_veri",
            "Total balance currently locked in escrow (whole VERI)",
        )
        .unwrap();

        registry
            .register(Box::new(requests_total.clone()))
            .unwrap();
        registry.register(Box::new(posts_total.clone())).unwrap();
        registry
            .register(Box::new(disputes_total.clone()))
            .unwrap();
        registry
            .register(Box::new(finalizations_total.clone()))
            .unwrap();
        registry
            .register(Box::new(events_emitted_total.clone()))
            .unwrap();
        registry
            .register(Box::new(registered_provers.clone()))
            .unwrap();
        registry.register(Box::new(open_requests.clone())).unwrap();
        registry
            .register(Box::new(locked_supply_veri.clone()))
            .unwrap();

        Self {
            registry,
            requests_total,
            posts_total,
            disputes_total,
            finalizations_total,
            events_emitted_total,
            registered_provers,
            open_requests,
            locked_supply_veri,
        }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_gather() {
        let m = Metrics::new();
        m.requests_total.inc();
        m.finalizations_total.inc_by(2);
        m.registered_provers.set(3);
        let text = m.gather();
        assert!(text.contains("veritor_requests_total"));
        assert!(text.contains("veritor_finalizations_total"));
        assert!(text.contains("veritor_registered_provers"));
    }

    #[test]
    fn test_all_metrics_registered() {
        let m = Metrics::new();
        let text = m.gather();

        assert!(text.contains("veritor_requests_total"));
        assert!(text.contains("veritor_posts_total"));
        assert!(text.contains("veritor_disputes_total"));
        assert!(text.contains("veritor_finalizations_total"));
        assert!(text.contains("veritor_events_emitted_total"));
        assert!(text.contains("veritor_open_requests"));
        assert!(text.contains("veritor_locked_supply_veri"));
    }
}
