use crate::{
    Instrumented, MutatingWebhook, Mutator, NoopRecorder, NoopTracer, Recorder, ReviewKind, Tracer,
};
use mutating_webhook_core::Reconstruct;
use std::sync::Arc;
use thiserror::Error;

/// Configures a mutating webhook.
///
/// The reconstructor decides how request payloads are decoded: a
/// [`StaticReconstructor`](crate::StaticReconstructor) for a single known
/// type, or a [`DynamicReconstructor`](crate::DynamicReconstructor) to infer
/// the type from each payload. A tracer or recorder that is not configured is
/// replaced by a no-op.
pub struct WebhookConfig<R, M> {
    pub name: String,
    pub reconstructor: R,
    pub mutator: Option<M>,
    pub tracer: Option<Arc<dyn Tracer>>,
    pub recorder: Option<Arc<dyn Recorder>>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: name is required")]
    MissingName,

    #[error("invalid configuration: mutator is required")]
    MissingMutator,
}

// === impl WebhookConfig ===

impl<R, M> WebhookConfig<R, M> {
    pub fn new(name: impl Into<String>, reconstructor: R) -> Self {
        Self {
            name: name.into(),
            reconstructor,
            mutator: None,
            tracer: None,
            recorder: None,
        }
    }

    pub fn with_mutator(mut self, mutator: M) -> Self {
        self.mutator = Some(mutator);
        self
    }

    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn with_recorder(mut self, recorder: impl Recorder + 'static) -> Self {
        self.recorder = Some(Arc::new(recorder));
        self
    }

    pub fn build(self) -> Result<Instrumented<MutatingWebhook<R, M>>, ConfigError>
    where
        R: Reconstruct,
        M: Mutator<R::Object>,
    {
        let Self {
            name,
            reconstructor,
            mutator,
            tracer,
            recorder,
        } = self;

        if name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        let mutator = mutator.ok_or(ConfigError::MissingMutator)?;

        Ok(Instrumented::new(
            MutatingWebhook::new(reconstructor, mutator),
            name,
            ReviewKind::Mutating,
            tracer.unwrap_or_else(|| Arc::new(NoopTracer)),
            recorder.unwrap_or_else(|| Arc::new(NoopRecorder)),
        ))
    }
}
