use crate::{AdmissionRequest, Recorder, ReviewKind, ReviewOutcome, Webhook};
use std::sync::Arc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{field, info_span, Instrument, Span};

/// Starts the span that covers a single review.
///
/// Spans are expected to declare `allowed` and `error` fields, which are
/// recorded once the review completes.
pub trait Tracer: Send + Sync {
    fn start_span(&self, webhook: &str, kind: ReviewKind) -> Span;
}

/// Produces an info-level `admission_review` span.
#[derive(Copy, Clone, Debug, Default)]
pub struct SpanTracer;

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTracer;

/// Wraps a [`Webhook`] to trace and time every review it performs.
///
/// The inner webhook's outcome is returned unchanged.
#[derive(Clone)]
pub struct Instrumented<W> {
    inner: W,
    name: String,
    kind: ReviewKind,
    tracer: Arc<dyn Tracer>,
    recorder: Arc<dyn Recorder>,
}

// === impl SpanTracer ===

impl Tracer for SpanTracer {
    fn start_span(&self, webhook: &str, kind: ReviewKind) -> Span {
        info_span!(
            "admission_review",
            webhook,
            %kind,
            allowed = field::Empty,
            error = field::Empty,
        )
    }
}

// === impl NoopTracer ===

impl Tracer for NoopTracer {
    fn start_span(&self, _: &str, _: ReviewKind) -> Span {
        Span::none()
    }
}

// === impl Instrumented ===

impl<W> Instrumented<W> {
    pub fn new(
        inner: W,
        name: impl Into<String>,
        kind: ReviewKind,
        tracer: Arc<dyn Tracer>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            inner,
            name: name.into(),
            kind,
            tracer,
            recorder,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ReviewKind {
        self.kind
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<W: Webhook> Webhook for Instrumented<W> {
    async fn review(&self, req: &AdmissionRequest, cancel: &CancellationToken) -> ReviewOutcome {
        let span = self.tracer.start_span(&self.name, self.kind);
        let start = time::Instant::now();

        let outcome = self.inner.review(req, cancel).instrument(span.clone()).await;

        span.record("allowed", outcome.allowed());
        if let Some(reason) = outcome.reason() {
            span.record("error", reason);
        }
        self.recorder.observe_review(
            &self.name,
            self.kind,
            outcome.allowed(),
            start.elapsed(),
        );

        outcome
    }
}

impl<W: std::fmt::Debug> std::fmt::Debug for Instrumented<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumented")
            .field("inner", &self.inner)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
