use crate::config::{ControllerConfig, LabelScope};
use crate::crds::Custompodcount;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::api::{ObjectMeta, Resource};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Label carrying the owning target's name under `LabelScope::PerTarget`.
pub const TARGET_LABEL_KEY: &str = "api.example.com/custompodcount";

const MAX_LABEL_VALUE_LEN: usize = 63;
const MAX_NAME_PREFIX_LEN: usize = 40;
const RANDOM_SUFFIX_LEN: usize = 5;

/// The label set that identifies the instances of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSelector {
    labels: BTreeMap<String, String>,
}

impl InstanceSelector {
    pub fn for_record(config: &ControllerConfig, cr: &Custompodcount) -> Self {
        let mut labels = BTreeMap::from([(config.label_key.clone(), config.label_value.clone())]);
        if config.label_scope == LabelScope::PerTarget {
            labels.insert(
                TARGET_LABEL_KEY.to_string(),
                label_safe(&cr.metadata.name.clone().unwrap_or_default()),
            );
        }
        InstanceSelector { labels }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// True if every selector label is present with the same value.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        match labels {
            Some(labels) => self
                .labels
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value)),
            None => self.labels.is_empty(),
        }
    }
}

impl fmt::Display for InstanceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}

/// Object names are valid label values except for their length; long ones
/// are cut and disambiguated with a digest of the full name.
fn label_safe(name: &str) -> String {
    if name.len() <= MAX_LABEL_VALUE_LEN {
        return name.to_string();
    }
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let head = name
        .get(..MAX_LABEL_VALUE_LEN - 9)
        .unwrap_or(name)
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{}-{}", head, &digest[..8])
}

fn name_prefix(config: &ControllerConfig, cr: &Custompodcount) -> String {
    match config.label_scope {
        LabelScope::Shared => config.label_value.clone(),
        LabelScope::PerTarget => {
            let name = cr.metadata.name.clone().unwrap_or_default();
            name.get(..MAX_NAME_PREFIX_LEN)
                .unwrap_or(&name)
                .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_string()
        }
    }
}

/// `<prefix>-<unix nanos>-<random>`. The random part keeps names apart when
/// several creates start within the same clock tick.
pub fn instance_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", prefix, nanos, suffix)
}

pub fn make_instance(
    config: &ControllerConfig,
    cr: &Custompodcount,
    selector: &InstanceSelector,
) -> Pod {
    let owner_references = if config.owner_references {
        cr.controller_owner_ref(&()).map(|oref| vec![oref])
    } else {
        None
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(instance_name(&name_prefix(config, cr))),
            namespace: cr.metadata.namespace.clone(),
            labels: Some(selector.labels().clone()),
            owner_references,
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: config.container_name.clone(),
                image: Some(config.image.clone()),
                ..Container::default()
            }],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}
