use crate::conditions::{find_condition, CONDITION_AVAILABLE};
use crate::error::Error;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::ResourceExt;
use std::fmt;

#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(group = "api.example.com", version = "v1alpha1", kind = "Custompodcount")]
#[kube(shortname = "cpc", namespaced)]
#[kube(status = "CustompodcountStatus")]
pub struct CustompodcountSpec {
    /// Number of instances that should be running.
    #[serde(rename = "sizePod", default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub size_pod: Option<i32>,

    /// Lower-case spelling of `sizePod` written by older manifests. It is a
    /// schema property of its own so the API server does not prune it.
    /// Ignored when `sizePod` is set.
    #[serde(rename = "sizepod", default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub legacy_size_pod: Option<i32>,
}

impl CustompodcountSpec {
    pub fn with_size_pod(size_pod: i32) -> Self {
        CustompodcountSpec {
            size_pod: Some(size_pod),
            legacy_size_pod: None,
        }
    }

    /// The declared count, from `sizePod` or else `sizepod`.
    pub fn declared_size_pod(&self) -> Option<i32> {
        self.size_pod.or(self.legacy_size_pod)
    }
}

#[derive(
    Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq,
)]
pub struct CustompodcountStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl CustompodcountStatus {
    pub fn available(&self) -> Option<&Condition> {
        find_condition(&self.conditions, CONDITION_AVAILABLE)
    }
}

impl Custompodcount {
    /// The declared instance count. An unset count and negative values that
    /// slipped past schema validation count as zero.
    pub fn target_count(&self) -> usize {
        self.spec
            .declared_size_pod()
            .and_then(|size_pod| usize::try_from(size_pod).ok())
            .unwrap_or(0)
    }

    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn key(&self) -> Result<TargetKey, Error> {
        let name = self
            .metadata
            .name
            .as_ref()
            .ok_or_else(|| Error::MissingObjectKey(".metadata.name"))?;
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(TargetKey::new(namespace, name.clone()))
    }
}

/// Namespace-scoped identity of one Custompodcount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TargetKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
