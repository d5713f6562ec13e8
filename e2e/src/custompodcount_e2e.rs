use crate::common::*;
use custompodcount_controller::conditions::{CONDITION_AVAILABLE, REASON_TARGET_COUNT_EXCEEDED};
use custompodcount_controller::crds::Custompodcount;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DeleteParams, ListParams},
    discovery::Discovery,
    Client,
};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::*;

const CR_NAME: &str = "custompod-sample";
const INSTANCE_SELECTOR: &str = "app=custompod-count";

pub fn custompodcount(size_pod: usize) -> String {
    format!(
        "
    apiVersion: api.example.com/v1alpha1
    kind: Custompodcount
    metadata:
      name: {}
      namespace: default
    spec:
      sizePod: {}
    ",
        CR_NAME, size_pod
    )
}

fn patch_size_pod(size_pod: usize) -> Result<(), Error> {
    let patch = format!(
        "[{{\"op\": \"replace\", \"path\": \"/spec/sizePod\", \"value\": {}}}]",
        size_pod
    );
    run_command(
        "kubectl",
        vec!["patch", "cpc", CR_NAME, "--type=json", "-p", patch.as_str()],
    )?;
    Ok(())
}

/// Waits until exactly `expected` instances exist. More than `expected`
/// fails right away, since the controller only ever adds instances.
async fn wait_for_exact(pod_api: &Api<Pod>, expected: usize) -> Result<(), Error> {
    wait_for_pods(pod_api, INSTANCE_SELECTOR, Duration::from_secs(360), |count| {
        if count > expected {
            Err(Error::InstanceCountFailed(format!(
                "{} instances, expected {}",
                count, expected
            )))
        } else {
            Ok(count == expected)
        }
    })
    .await?;
    info!("We have {} instances now.", expected);
    Ok(())
}

async fn wait_for_condition(cr_api: &Api<Custompodcount>, reason: Option<&str>) -> Result<(), Error> {
    let timeout = Duration::from_secs(120);
    let start = Instant::now();
    loop {
        sleep(Duration::from_secs(5)).await;
        if start.elapsed() > timeout {
            return Err(Error::StatusFailed(format!(
                "no {} condition with reason {:?}",
                CONDITION_AVAILABLE, reason
            )));
        }
        let cr = cr_api.get(CR_NAME).await?;
        let available = cr.status.as_ref().and_then(|status| status.available());
        match available {
            Some(cond) if cond.status == "True" && reason.map_or(true, |r| cond.reason == r) => {
                info!("{} condition: {}", CONDITION_AVAILABLE, cond.message);
                return Ok(());
            }
            Some(cond) => info!("{} condition is {} ({}); still waiting.", CONDITION_AVAILABLE, cond.status, cond.reason),
            None => info!("No {} condition yet.", CONDITION_AVAILABLE),
        }
    }
}

pub async fn desired_state_test(client: Client) -> Result<(), Error> {
    let pod_api: Api<Pod> = Api::default_namespaced(client.clone());
    let cr_api: Api<Custompodcount> = Api::default_namespaced(client);
    wait_for_exact(&pod_api, 3).await?;
    wait_for_condition(&cr_api, None).await?;
    info!("Desired state test passed.");
    Ok(())
}

/// Lowers the target and checks that nothing is removed, then raises it past
/// the initial count.
pub async fn scaling_test(client: Client) -> Result<(), Error> {
    let pod_api: Api<Pod> = Api::default_namespaced(client.clone());
    let cr_api: Api<Custompodcount> = Api::default_namespaced(client);

    patch_size_pod(1)?;
    wait_for_condition(&cr_api, Some(REASON_TARGET_COUNT_EXCEEDED)).await?;
    let pods = pod_api
        .list(&ListParams::default().labels(INSTANCE_SELECTOR))
        .await?;
    if pods.items.len() != 3 {
        return Err(Error::InstanceCountFailed(format!(
            "{} instances after lowering the target, expected 3 to remain",
            pods.items.len()
        )));
    }
    info!("Lowering the target removed nothing.");

    patch_size_pod(5)?;
    wait_for_exact(&pod_api, 5).await?;

    info!("Scaling test passed.");
    Ok(())
}

/// Deletes the Custompodcount and waits for the garbage collector to remove
/// the instances it owns.
pub async fn deletion_test(client: Client) -> Result<(), Error> {
    let pod_api: Api<Pod> = Api::default_namespaced(client.clone());
    let cr_api: Api<Custompodcount> = Api::default_namespaced(client);

    cr_api.delete(CR_NAME, &DeleteParams::foreground()).await?;
    wait_for_pods(&pod_api, INSTANCE_SELECTOR, Duration::from_secs(360), |count| {
        Ok(count == 0)
    })
    .await?;

    info!("Deletion test passed.");
    Ok(())
}

async fn setup(size_pod: usize) -> Result<Client, Error> {
    // check if the CRD is already registered
    let client = Client::try_default().await?;
    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    match crd_api.get("custompodcounts.api.example.com").await {
        Err(e) => {
            error!("No CRD found, create one before run the e2e test.");
            return Err(Error::CRDGetFailed(e));
        }
        Ok(_) => info!("CRD found, continue to run the e2e test."),
    }

    let discovery = Discovery::new(client.clone()).run().await?;
    apply(custompodcount(size_pod), client.clone(), &discovery).await?;
    Ok(client)
}

pub async fn custompodcount_e2e_test() -> Result<(), Error> {
    let client = setup(3).await?;
    desired_state_test(client.clone()).await?;
    deletion_test(client).await?;
    info!("E2e test passed.");
    Ok(())
}

pub async fn custompodcount_scaling_e2e_test() -> Result<(), Error> {
    let client = setup(3).await?;
    desired_state_test(client.clone()).await?;
    scaling_test(client.clone()).await?;
    deletion_test(client).await?;
    info!("E2e test passed.");
    Ok(())
}
