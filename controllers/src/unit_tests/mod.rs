pub mod controller_runtime;

use crate::config::ControllerConfig;
use crate::crds::{Custompodcount, CustompodcountSpec, TargetKey};
use crate::executable_model::ExecutableApiServer;
use crate::instance::InstanceSelector;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub fn custompodcount(namespace: &str, name: &str, size_pod: i32) -> Custompodcount {
    let mut cr = Custompodcount::new(name, CustompodcountSpec::with_size_pod(size_pod));
    cr.metadata.namespace = Some(namespace.to_string());
    cr
}

/// An API server holding a single Custompodcount `default/web`.
pub fn server_with_target(size_pod: i32) -> (ExecutableApiServer, TargetKey) {
    let server = ExecutableApiServer::new();
    server
        .create_record(custompodcount("default", "web", size_pod))
        .unwrap();
    (server, TargetKey::new("default", "web"))
}

/// Instances the controller would count for `key` under `config`.
pub fn instance_count(server: &ExecutableApiServer, config: &ControllerConfig, key: &TargetKey) -> usize {
    let cr = server.record(key).unwrap();
    server
        .pods(&key.namespace, &InstanceSelector::for_record(config, &cr))
        .len()
}

pub fn labeled_pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }
}

/// Pods carrying the default shared instance label, as if created earlier.
pub fn add_existing_instances(server: &ExecutableApiServer, namespace: &str, count: usize) {
    for i in 0..count {
        server
            .add_pod(labeled_pod(
                namespace,
                &format!("custompod-count-existing-{}", i),
                &[("app", "custompod-count")],
            ))
            .unwrap();
    }
}
