//! Reconstructs owned, typed resources from the raw bytes carried by an
//! admission request.
//!
//! A [`StaticReconstructor`] always decodes into one known type. A
//! [`DynamicReconstructor`] reads the payload's `apiVersion` and `kind` and
//! dispatches to a decoder registered for that type.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    core::{DynamicObject, GroupVersionKind},
    Resource,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use std::{any::Any, collections::BTreeMap, collections::HashMap, fmt, marker::PhantomData};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode object: admission request is missing the object")]
    Empty,

    #[error("failed to decode object: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to decode object: missing type metadata (apiVersion and kind)")]
    MissingTypeMeta,

    #[error("unknown resource type: {0}")]
    UnknownType(ResourceType),
}

/// Turns raw bytes into a freshly allocated object.
///
/// Implementations hold no per-request state and may be shared freely across
/// concurrent reviews.
pub trait Reconstruct: Send + Sync {
    type Object: Serialize + Send + Sync;

    fn reconstruct(&self, raw: &[u8]) -> Result<Self::Object, Error>;
}

/// The metadata capability of a reconstructed resource.
pub trait Object: Any + Send + Sync {
    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn to_value(&self) -> serde_json::Result<serde_json::Value>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.metadata_mut().name = Some(name.to_string());
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut().namespace = Some(namespace.to_string());
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        self.metadata().labels.as_ref().unwrap_or(&EMPTY)
    }

    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata_mut().labels.get_or_insert_with(BTreeMap::new)
    }

    fn annotations(&self) -> &BTreeMap<String, String> {
        self.metadata().annotations.as_ref().unwrap_or(&EMPTY)
    }

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
    }
}

static EMPTY: BTreeMap<String, String> = BTreeMap::new();

/// Identifies a resource type by its API group, version, and kind.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
}

/// Decodes every payload into `K`.
pub struct StaticReconstructor<K> {
    _kind: PhantomData<fn() -> K>,
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Object>, Error>;

/// Decodes payloads according to the type they declare.
///
/// Types must be registered up front; a payload whose type has no registered
/// decoder fails with [`Error::UnknownType`].
#[derive(Clone, Default)]
pub struct DynamicReconstructor {
    decoders: HashMap<ResourceType, DecodeFn>,
}

#[derive(Deserialize)]
struct TypeFields {
    #[serde(rename = "apiVersion")]
    api_version: Option<String>,
    kind: Option<String>,
}

// === impl Object ===

impl<K> Object for K
where
    K: Resource + Serialize + Send + Sync + 'static,
{
    fn metadata(&self) -> &ObjectMeta {
        Resource::meta(self)
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        Resource::meta_mut(self)
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn Object {
    pub fn downcast_ref<K: Object>(&self) -> Option<&K> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<K: Object>(&mut self) -> Option<&mut K> {
        self.as_any_mut().downcast_mut()
    }
}

impl Serialize for dyn Object {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error as _;
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("namespace", &self.namespace())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// === impl ResourceType ===

impl ResourceType {
    pub fn of<K>() -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        }
    }

    /// Splits an `apiVersion` such as `apps/v1` or `v1` into group and version.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl From<&GroupVersionKind> for ResourceType {
    fn from(gvk: &GroupVersionKind) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

// === impl StaticReconstructor ===

impl<K> StaticReconstructor<K> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<K> Default for StaticReconstructor<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for StaticReconstructor<K> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for StaticReconstructor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticReconstructor")
            .field(&std::any::type_name::<K>())
            .finish()
    }
}

impl<K> Reconstruct for StaticReconstructor<K>
where
    K: Object + Serialize + DeserializeOwned,
{
    type Object = K;

    fn reconstruct(&self, raw: &[u8]) -> Result<K, Error> {
        decode(raw)
    }
}

// === impl DynamicReconstructor ===

impl DynamicReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes payloads declaring `K`'s type into `K`.
    pub fn register<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()> + Object + Serialize + DeserializeOwned,
    {
        self.decoders
            .insert(ResourceType::of::<K>(), decode_boxed::<K>);
        self
    }

    /// Decodes payloads declaring `gvk` into a schema-agnostic [`DynamicObject`].
    pub fn register_dynamic(mut self, gvk: &GroupVersionKind) -> Self {
        self.decoders
            .insert(gvk.into(), decode_boxed::<DynamicObject>);
        self
    }

    pub fn is_registered(&self, rt: &ResourceType) -> bool {
        self.decoders.contains_key(rt)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for DynamicReconstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.decoders.keys().collect::<Vec<_>>();
        types.sort();
        f.debug_struct("DynamicReconstructor")
            .field("types", &types)
            .finish()
    }
}

impl Reconstruct for DynamicReconstructor {
    type Object = Box<dyn Object>;

    fn reconstruct(&self, raw: &[u8]) -> Result<Box<dyn Object>, Error> {
        if is_blank(raw) {
            return Err(Error::Empty);
        }

        let TypeFields { api_version, kind } =
            serde_json::from_slice(raw).map_err(Error::Decode)?;
        let (Some(api_version), Some(kind)) = (api_version, kind) else {
            return Err(Error::MissingTypeMeta);
        };

        let rt = ResourceType::from_api_version(&api_version, &kind);
        let decode = self.decoders.get(&rt).ok_or(Error::UnknownType(rt))?;
        decode(raw)
    }
}

fn decode<K: DeserializeOwned>(raw: &[u8]) -> Result<K, Error> {
    if is_blank(raw) {
        return Err(Error::Empty);
    }
    serde_json::from_slice(raw).map_err(Error::Decode)
}

fn decode_boxed<K>(raw: &[u8]) -> Result<Box<dyn Object>, Error>
where
    K: Object + DeserializeOwned,
{
    let obj = decode::<K>(raw)?;
    Ok(Box::new(obj))
}

fn is_blank(raw: &[u8]) -> bool {
    raw.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
    use maplit::btreemap;

    const POD: &[u8] = br#"{"apiVersion":"v1","kind":"Pod","metadata":{"name":"pod1","namespace":"ns-0","labels":{"app":"web"}}}"#;

    #[test]
    fn static_decodes_typed_object() {
        let pod = StaticReconstructor::<Pod>::new()
            .reconstruct(POD)
            .expect("pod must decode");
        assert_eq!(pod.name(), Some("pod1"));
        assert_eq!(pod.namespace(), Some("ns-0"));
        assert_eq!(
            *pod.labels(),
            btreemap! { "app".to_string() => "web".to_string() }
        );
    }

    #[test]
    fn static_returns_independent_copies() {
        let rc = StaticReconstructor::<Pod>::new();
        let mut first = rc.reconstruct(POD).unwrap();
        first.labels_mut().insert("foo".into(), "bar".into());
        first.set_name("renamed");

        let second = rc.reconstruct(POD).unwrap();
        assert_eq!(second.name(), Some("pod1"));
        assert!(!second.labels().contains_key("foo"));
    }

    #[test]
    fn static_rejects_empty_payload() {
        let rc = StaticReconstructor::<Pod>::new();
        assert!(matches!(rc.reconstruct(b""), Err(Error::Empty)));
        assert!(matches!(rc.reconstruct(b" \n"), Err(Error::Empty)));
    }

    #[test]
    fn static_rejects_malformed_payload() {
        let err = StaticReconstructor::<Pod>::new()
            .reconstruct(b"{invalid")
            .expect_err("malformed json must fail");
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().starts_with("failed to decode object"));
    }

    #[test]
    fn static_rejects_incompatible_payload() {
        let raw = br#"{"apiVersion":"v1","kind":"Pod","metadata":{"labels":"nope"}}"#;
        let err = StaticReconstructor::<Pod>::new()
            .reconstruct(raw)
            .expect_err("labels must be a map");
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn static_decodes_schemaless_object() {
        let raw = br#"{"metadata":{"name":"pod1","labels":{}}}"#;
        let obj = StaticReconstructor::<DynamicObject>::new()
            .reconstruct(raw)
            .unwrap();
        assert_eq!(obj.name(), Some("pod1"));
        assert!(obj.labels().is_empty());
    }

    #[test]
    fn dynamic_dispatches_on_type() {
        let rc = DynamicReconstructor::new()
            .register::<Pod>()
            .register::<Deployment>();
        assert_eq!(rc.len(), 2);
        assert!(rc.is_registered(&ResourceType::of::<Pod>()));
        assert!(!rc.is_registered(&ResourceType::from_api_version("v1", "Service")));

        let mut obj = rc.reconstruct(POD).expect("pod must decode");
        assert_eq!(obj.name(), Some("pod1"));
        let pod = obj.downcast_mut::<Pod>().expect("must decode as a pod");
        pod.metadata.name = Some("pod2".to_string());
        assert_eq!(obj.name(), Some("pod2"));
        assert!(obj.downcast_ref::<Deployment>().is_none());

        let raw = br#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{"name":"web"}}"#;
        let obj = rc.reconstruct(raw).expect("deployment must decode");
        assert!(obj.downcast_ref::<Deployment>().is_some());
    }

    #[test]
    fn dynamic_decodes_registered_custom_kind() {
        let gvk = GroupVersionKind::gvk("example.com", "v1alpha1", "Widget");
        let rc = DynamicReconstructor::new().register_dynamic(&gvk);

        let raw = br#"{"apiVersion":"example.com/v1alpha1","kind":"Widget","metadata":{"name":"w"},"spec":{"size":3}}"#;
        let mut obj = rc.reconstruct(raw).expect("widget must decode");
        obj.annotations_mut()
            .insert("example.com/seen".into(), "true".into());

        let value = obj.to_value().unwrap();
        assert_eq!(value["spec"]["size"], 3);
        assert_eq!(value["metadata"]["annotations"]["example.com/seen"], "true");
        let dynamic = obj.downcast_ref::<DynamicObject>().unwrap();
        assert_eq!(dynamic.data["spec"]["size"], 3);
    }

    #[test]
    fn dynamic_rejects_unregistered_type() {
        let rc = DynamicReconstructor::new().register::<Pod>();
        let raw = br#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{"name":"web"}}"#;
        match rc.reconstruct(raw) {
            Err(Error::UnknownType(rt)) => {
                assert_eq!(rt, ResourceType::of::<Deployment>());
                assert_eq!(rt.to_string(), "apps/v1, Kind=Deployment");
            }
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[test]
    fn dynamic_requires_type_metadata() {
        let rc = DynamicReconstructor::new().register::<Pod>();
        assert!(matches!(
            rc.reconstruct(br#"{"metadata":{"name":"pod1"}}"#),
            Err(Error::MissingTypeMeta)
        ));
        assert!(matches!(rc.reconstruct(b"{invalid"), Err(Error::Decode(_))));
        assert!(matches!(rc.reconstruct(b""), Err(Error::Empty)));
    }

    #[test]
    fn resource_type_parses_api_version() {
        let core = ResourceType::from_api_version("v1", "Pod");
        assert_eq!(core, ResourceType::of::<Pod>());
        assert_eq!(core.api_version(), "v1");
        assert_eq!(core.to_string(), "v1, Kind=Pod");

        let apps = ResourceType::from_api_version("apps/v1", "Deployment");
        assert_eq!(apps.group, "apps");
        assert_eq!(apps.version, "v1");
    }
}
