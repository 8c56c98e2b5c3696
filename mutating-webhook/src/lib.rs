#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! A mutating admission webhook core.
//!
//! A [`MutatingWebhook`] reconstructs the object carried by an admission
//! request, hands it to a [`Mutator`], and answers with the JSON patch between
//! the original and mutated object. Any failure along the way becomes a
//! denial. [`WebhookConfig::build`] wraps the webhook in [`Instrumented`],
//! which records a span and a metric sample for every review.

pub use mutating_webhook_core::{
    object, patch, DynamicReconstructor, Object, Patch, Reconstruct, ResourceType,
    StaticReconstructor,
};

pub mod admission;
mod config;
mod instrument;
mod metrics;
mod mutating;
mod review;


pub use self::{
    config::{ConfigError, WebhookConfig},
    instrument::{Instrumented, NoopTracer, SpanTracer, Tracer},
    metrics::{NoopRecorder, Recorder, ReviewMetrics},
    mutating::{Context, Error, Flow, MutatingWebhook, Mutator},
    review::{AdmissionRequest, Decision, ReviewOutcome},
};
pub use kube::core::admission::Operation;
pub use tokio_util::sync::CancellationToken;

/// Reviews a single admission request.
///
/// Implementations always produce an outcome; failures are reported as
/// denials rather than errors.
#[async_trait::async_trait]
pub trait Webhook: Send + Sync {
    async fn review(&self, req: &AdmissionRequest, cancel: &CancellationToken) -> ReviewOutcome;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReviewKind {
    Mutating,
}

// === impl ReviewKind ===

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mutating => "mutating",
        }
    }
}

impl std::fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
