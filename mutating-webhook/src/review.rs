use json_patch::Patch;
use kube::core::{admission, admission::Operation, DynamicObject};
use serde::Deserialize;
use serde_json::value::RawValue;

/// The parts of an admission request that a review consumes.
///
/// `object` and `old_object` hold the serialized resource exactly as it was
/// received.
#[derive(Clone, Debug)]
pub struct AdmissionRequest {
    pub uid: String,
    pub operation: Operation,
    pub namespace: Option<String>,
    pub name: String,
    pub object: Option<Vec<u8>>,
    pub old_object: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReviewOutcome {
    pub uid: String,
    pub decision: Decision,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Allowed(Patch),
    Denied(String),
}

#[derive(Deserialize)]
struct RawReview<'a> {
    #[serde(borrow)]
    request: Option<RawRequest<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest<'a> {
    uid: String,
    operation: Operation,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default, borrow)]
    object: Option<&'a RawValue>,
    #[serde(default, borrow)]
    old_object: Option<&'a RawValue>,
}

// === impl AdmissionRequest ===

impl AdmissionRequest {
    pub fn new(uid: impl Into<String>, operation: Operation) -> Self {
        Self {
            uid: uid.into(),
            operation,
            namespace: None,
            name: String::new(),
            object: None,
            old_object: None,
        }
    }

    pub fn with_object(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.object = Some(raw.into());
        self
    }

    pub fn with_old_object(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.old_object = Some(raw.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The serialized object under review.
    ///
    /// Deletions carry the resource being removed in `oldObject`, so it is
    /// used instead of `object` for them.
    pub fn raw_object(&self) -> &[u8] {
        let raw = match self.operation {
            Operation::Delete => &self.old_object,
            _ => &self.object,
        };
        raw.as_deref().unwrap_or_default()
    }

    /// Parses the `request` of a serialized `AdmissionReview`, keeping the
    /// object payloads byte-for-byte.
    pub fn from_review_slice(review: &[u8]) -> serde_json::Result<Self> {
        use serde::de::Error as _;

        let RawReview { request } = serde_json::from_slice(review)?;
        let req =
            request.ok_or_else(|| serde_json::Error::custom("admission review has no request"))?;
        Ok(Self {
            uid: req.uid,
            operation: req.operation,
            namespace: req.namespace,
            name: req.name,
            object: req.object.map(|raw| raw.get().as_bytes().to_vec()),
            old_object: req.old_object.map(|raw| raw.get().as_bytes().to_vec()),
        })
    }
}

impl TryFrom<&admission::AdmissionRequest<DynamicObject>> for AdmissionRequest {
    type Error = serde_json::Error;

    fn try_from(req: &admission::AdmissionRequest<DynamicObject>) -> Result<Self, Self::Error> {
        let object = req.object.as_ref().map(serde_json::to_vec).transpose()?;
        let old_object = req.old_object.as_ref().map(serde_json::to_vec).transpose()?;
        Ok(Self {
            uid: req.uid.clone(),
            operation: req.operation.clone(),
            namespace: req.namespace.clone(),
            name: req.name.clone(),
            object,
            old_object,
        })
    }
}

// === impl ReviewOutcome ===

impl ReviewOutcome {
    pub fn allow(uid: impl Into<String>, patch: Patch) -> Self {
        Self {
            uid: uid.into(),
            decision: Decision::Allowed(patch),
        }
    }

    pub fn deny(uid: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            uid: uid.into(),
            decision: Decision::Denied(reason.to_string()),
        }
    }

    pub fn allowed(&self) -> bool {
        matches!(self.decision, Decision::Allowed(_))
    }

    /// The patch to apply; only present when the request is allowed.
    pub fn patch(&self) -> Option<&Patch> {
        match &self.decision {
            Decision::Allowed(patch) => Some(patch),
            Decision::Denied(_) => None,
        }
    }

    /// Why the request was denied; only present when it was.
    pub fn reason(&self) -> Option<&str> {
        match &self.decision {
            Decision::Allowed(_) => None,
            Decision::Denied(reason) => Some(reason),
        }
    }
}
