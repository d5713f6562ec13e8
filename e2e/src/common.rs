use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DynamicObject, ListParams, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client,
};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::*;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to talk to the cluster: {0}")]
    ClientFailed(#[from] kube::Error),

    #[error("Failed to apply yaml file!")]
    ApplyFailed,

    #[error("Failed to parse the yaml file!")]
    ParseYamlFailed(#[from] serde_yaml::Error),

    #[error("Failed to parse the json format!")]
    ParseJsonFailed(#[from] serde_json::Error),

    #[error("Failed to run command: {0}")]
    CommandFailed(#[from] std::io::Error),

    #[error("Failed to get CRD: {0}")]
    CRDGetFailed(#[source] kube::Error),

    #[error("Timeout, e2e test failed!")]
    Timeout,

    #[error("Instance count is not consistent with the Custompodcount spec: {0}")]
    InstanceCountFailed(String),

    #[error("Custompodcount status was not reported: {0}")]
    StatusFailed(String),
}

pub async fn apply(yaml: String, client: Client, discovery: &Discovery) -> Result<String, Error> {
    let ssapply = PatchParams::apply("kubectl-light").force();
    let doc = serde_yaml::from_str(&yaml)?;

    let obj: DynamicObject = serde_yaml::from_value(doc)?;
    let namespace = obj.metadata.namespace.as_deref();
    let gvk = match obj.types.as_ref().map(GroupVersionKind::try_from) {
        Some(Ok(gvk)) => gvk,
        _ => {
            error!("cannot apply object without valid TypeMeta {:?}", obj);
            return Err(Error::ApplyFailed);
        }
    };
    let name = obj.name_any();
    if let Some((ar, caps)) = discovery.resolve_gvk(&gvk) {
        let api = dynamic_api(ar, caps, client.clone(), namespace);
        info!("Applying {}: \n{}", gvk.kind, serde_yaml::to_string(&obj)?);
        let data: serde_json::Value = serde_json::to_value(&obj)?;
        api.patch(&name, &ssapply, &Patch::Apply(data)).await?;
        info!("applied {} {}", gvk.kind, name);
    } else {
        error!("Cannot apply document for unknown {:?}", gvk);
        return Err(Error::ApplyFailed);
    }

    Ok(name)
}

fn dynamic_api(
    ar: ApiResource,
    caps: ApiCapabilities,
    client: Client,
    ns: Option<&str>,
) -> Api<DynamicObject> {
    if caps.scope == Scope::Cluster {
        Api::all_with(client, &ar)
    } else if let Some(namespace) = ns {
        Api::namespaced_with(client, namespace, &ar)
    } else {
        Api::default_namespaced_with(client, &ar)
    }
}

pub fn run_command(program: &str, args: Vec<&str>) -> Result<(String, String), Error> {
    info!("{} {}", program, args.join(" "));
    let cmd = Command::new(program).args(args).output()?;
    let out = String::from_utf8_lossy(&cmd.stdout).to_string();
    let err = String::from_utf8_lossy(&cmd.stderr).to_string();
    info!("cmd output: {}", out);
    if !err.is_empty() {
        info!("cmd error: {}", err);
    }
    Ok((out, err))
}

/// Polls the pods matching `selector` every five seconds until `done` accepts
/// their count. `done` returns Err to fail the test early.
pub async fn wait_for_pods<F>(
    pod_api: &Api<Pod>,
    selector: &str,
    timeout: Duration,
    mut done: F,
) -> Result<usize, Error>
where
    F: FnMut(usize) -> Result<bool, Error>,
{
    let start = Instant::now();
    let lp = ListParams::default().labels(selector);
    loop {
        sleep(Duration::from_secs(5)).await;
        if start.elapsed() > timeout {
            error!("Time out waiting for pods matching {}", selector);
            return Err(Error::Timeout);
        }
        match pod_api.list(&lp).await {
            Err(e) => {
                info!("List pods failed with error {}.", e);
                continue;
            }
            Ok(pods) => {
                let count = pods.items.len();
                if done(count)? {
                    return Ok(count);
                }
                info!("Pod number is {}; still waiting.", count);
            }
        }
    }
}
