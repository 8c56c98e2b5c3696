use crate::{AdmissionRequest, ReviewOutcome, Webhook};
use json_patch::Patch;
use mutating_webhook_core::{object, patch, Reconstruct};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Reviews requests by mutating the reconstructed object and returning the
/// resulting patch.
///
/// The webhook never denies a request on its own: only a failure to decode,
/// mutate, serialize or diff the object produces a denial.
#[derive(Clone, Debug)]
pub struct MutatingWebhook<R, M> {
    reconstructor: R,
    mutator: M,
}

/// Mutates a reconstructed object in place.
#[async_trait::async_trait]
pub trait Mutator<K: Send>: Send + Sync {
    async fn mutate(&self, cx: &Context<'_>, obj: &mut K) -> anyhow::Result<Flow>;
}

/// Returned by a [`Mutator`] to indicate whether later mutation steps should
/// run. Either way the object is diffed as it was left.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Continue,
    Stop,
}

/// What a [`Mutator`] knows about the review it's participating in.
#[derive(Copy, Clone, Debug)]
pub struct Context<'a> {
    pub request: &'a AdmissionRequest,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reconstruct(#[from] object::Error),

    #[error("{0}")]
    Mutate(anyhow::Error),

    #[error("failed to serialize mutated object: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to compute patch: {0}")]
    Patch(#[from] patch::Error),
}

// === impl MutatingWebhook ===

impl<R, M> MutatingWebhook<R, M> {
    pub fn new(reconstructor: R, mutator: M) -> Self {
        Self {
            reconstructor,
            mutator,
        }
    }

    pub fn reconstructor(&self) -> &R {
        &self.reconstructor
    }

    pub fn mutator(&self) -> &M {
        &self.mutator
    }
}

impl<R, M> MutatingWebhook<R, M>
where
    R: Reconstruct,
    M: Mutator<R::Object>,
{
    async fn compute_patch(
        &self,
        req: &AdmissionRequest,
        cancel: &CancellationToken,
    ) -> Result<Patch, Error> {
        let raw = req.raw_object();
        let mut obj = self.reconstructor.reconstruct(raw)?;

        let cx = Context {
            request: req,
            cancel,
        };
        let flow = self
            .mutator
            .mutate(&cx, &mut obj)
            .await
            .map_err(Error::Mutate)?;
        if flow == Flow::Stop {
            debug!(uid = %req.uid, "Mutator stopped further mutation");
        }

        let mutated = serde_json::to_vec(&obj).map_err(Error::Serialize)?;
        let patch = patch::diff(raw, &mutated)?;
        Ok(patch)
    }
}

#[async_trait::async_trait]
impl<R, M> Webhook for MutatingWebhook<R, M>
where
    R: Reconstruct,
    M: Mutator<R::Object>,
{
    async fn review(&self, req: &AdmissionRequest, cancel: &CancellationToken) -> ReviewOutcome {
        debug!(
            uid = %req.uid,
            operation = ?req.operation,
            ns = req.namespace.as_deref().unwrap_or_default(),
            name = %req.name,
            "Reviewing request",
        );

        match self.compute_patch(req, cancel).await {
            Ok(patch) => {
                debug!(
                    uid = %req.uid,
                    patch = %serde_json::to_string(&patch).unwrap_or_default(),
                    "Computed patch",
                );
                ReviewOutcome::allow(req.uid.clone(), patch)
            }
            Err(error) => {
                error!(%error, uid = %req.uid, "Admission review failed");
                ReviewOutcome::deny(req.uid.clone(), error)
            }
        }
    }
}

// === impl Mutator ===

#[async_trait::async_trait]
impl<K, F> Mutator<K> for F
where
    K: Send,
    F: Fn(&mut K) -> anyhow::Result<Flow> + Send + Sync,
{
    async fn mutate(&self, _cx: &Context<'_>, obj: &mut K) -> anyhow::Result<Flow> {
        (self)(obj)
    }
}

// === impl Context ===

impl Context<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails if the review has been cancelled, so mutators can bail out with
    /// `?` between steps.
    pub fn check_cancelled(&self) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("review cancelled");
        }
        Ok(())
    }
}
