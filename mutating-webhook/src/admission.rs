//! Translation between kube-rs admission types and reviews.

use crate::{AdmissionRequest, Decision, ReviewOutcome, Webhook};
use kube::core::{
    admission::{self, AdmissionResponse},
    DynamicObject,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Reviews a kube-rs admission request, answering with a response that echoes
/// the request's UID.
pub async fn review<W>(
    webhook: &W,
    req: &admission::AdmissionRequest<DynamicObject>,
    cancel: &CancellationToken,
) -> AdmissionResponse
where
    W: Webhook + ?Sized,
{
    let rsp = AdmissionResponse::from(req);

    let request = match AdmissionRequest::try_from(req) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, uid = %req.uid, "Invalid admission request");
            return rsp.deny(error);
        }
    };

    let outcome = webhook.review(&request, cancel).await;
    respond(rsp, outcome)
}

/// Fills in `rsp` from a review outcome: a JSON patch when allowed, or the
/// denial message otherwise.
pub fn respond(rsp: AdmissionResponse, outcome: ReviewOutcome) -> AdmissionResponse {
    match outcome.decision {
        Decision::Allowed(patch) => match rsp.clone().with_patch(patch) {
            Ok(rsp) => rsp,
            Err(error) => {
                error!(%error, uid = %outcome.uid, "Failed to encode patch");
                rsp.deny(error)
            }
        },
        Decision::Denied(reason) => rsp.deny(reason),
    }
}
