use crate::ReviewKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::time::Duration;

/// Receives one sample for every completed review.
pub trait Recorder: Send + Sync {
    fn observe_review(&self, webhook: &str, kind: ReviewKind, allowed: bool, elapsed: Duration);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRecorder;

/// Prometheus review latencies, labeled by webhook, review kind and decision.
#[derive(Clone, Debug)]
pub struct ReviewMetrics {
    durations: Family<ReviewLabels, Histogram>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    webhook: String,
    kind: &'static str,
    allowed: &'static str,
}

// === impl ReviewMetrics ===

impl ReviewMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let durations = Family::<ReviewLabels, Histogram>::new_with_constructor(|| {
            // Admission requests time out after 10s by default.
            Histogram::new([0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
        });
        reg.register_with_unit(
            "review_duration",
            "Histogram of admission review latency (seconds)",
            Unit::Seconds,
            durations.clone(),
        );

        Self { durations }
    }
}

impl Recorder for ReviewMetrics {
    fn observe_review(&self, webhook: &str, kind: ReviewKind, allowed: bool, elapsed: Duration) {
        let labels = ReviewLabels {
            webhook: webhook.to_string(),
            kind: kind.as_str(),
            allowed: if allowed { "true" } else { "false" },
        };
        self.durations
            .get_or_create(&labels)
            .observe(elapsed.as_secs_f64());
    }
}

// === impl NoopRecorder ===

impl Recorder for NoopRecorder {
    fn observe_review(&self, _: &str, _: ReviewKind, _: bool, _: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_labeled_samples() {
        let mut reg = Registry::default();
        let metrics = ReviewMetrics::register(&mut reg);

        metrics.observe_review("injector", ReviewKind::Mutating, true, Duration::from_millis(3));
        metrics.observe_review("injector", ReviewKind::Mutating, true, Duration::from_millis(7));
        metrics.observe_review("injector", ReviewKind::Mutating, false, Duration::from_secs(1));

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &reg).unwrap();
        assert!(text.contains(
            r#"review_duration_seconds_count{webhook="injector",kind="mutating",allowed="true"} 2"#
        ));
        assert!(text.contains(
            r#"review_duration_seconds_count{webhook="injector",kind="mutating",allowed="false"} 1"#
        ));
    }
}
