// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::cluster::{ClusterApi, KubeCluster};
use crate::config::ControllerConfig;
use crate::crds::{Custompodcount, TargetKey};
use crate::error::Error;
use crate::reconciler::reconcile;
use futures::StreamExt;
use kube::{
    api::{Api, Resource},
    runtime::{
        controller::{self, Action, Controller},
        predicates,
        reflector::{self, ObjectRef},
        watcher, WatchStreamExt,
    },
    Client,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::*;

pub const CONTROLLER_NAME: &str = "custompodcount-controller";

/// Data is passed to reconcile_with and error_policy.
/// It carries the cluster API handle, the configuration and the per-object
/// failure counts that drive the error backoff.
pub struct Data<C = KubeCluster> {
    pub cluster: C,
    pub config: ControllerConfig,
    pub backoff: ErrorBackoff,
}

impl<C: ClusterApi> Data<C> {
    pub fn new(cluster: C, config: ControllerConfig) -> Self {
        let backoff = ErrorBackoff::new(config.error_backoff, config.max_error_backoff);
        Data {
            cluster,
            config,
            backoff,
        }
    }
}

/// Exponential requeue delays for objects whose reconciliation keeps failing.
/// A success resets the object's count.
pub struct ErrorBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<TargetKey, u32>>,
}

impl ErrorBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        ErrorBackoff {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records one more failure of `key` and returns how long to wait before
    /// the next attempt: `base * 2^(failures - 1)`, capped at `max`.
    pub fn next_delay(&self, key: &TargetKey) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.clone()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn reset(&self, key: &TargetKey) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// The reconcile function registered with kube-rs. kube-rs invokes it for every
/// event on a Custompodcount and whenever a previous requeue expires; the
/// object it passes only serves to identify the target, which is re-read
/// from the API server by `reconcile`.
pub async fn reconcile_with<C: ClusterApi>(
    cr: Arc<Custompodcount>,
    ctx: Arc<Data<C>>,
) -> Result<Action, Error> {
    let key = cr.key()?;
    let action = reconcile(&ctx.cluster, &ctx.config, &key).await?;
    ctx.backoff.reset(&key);
    Ok(action)
}

/// error_policy defines the controller's behavior when the reconcile ends with an error.
pub fn error_policy<C: ClusterApi>(
    cr: Arc<Custompodcount>,
    error: &Error,
    ctx: Arc<Data<C>>,
) -> Action {
    match cr.key() {
        Ok(key) => {
            let delay = ctx.backoff.next_delay(&key);
            warn!(object = %key, error = %error, delay_secs = delay.as_secs(), "Reconcile failed, requeueing");
            Action::requeue(delay)
        }
        // Without a name or namespace there is nothing to retry against.
        Err(_) => {
            error!(error = %error, "Reconcile failed for an object without identity");
            Action::await_change()
        }
    }
}

pub fn report_controller_reconciled<K, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<Error, QueueErr>>,
) where
    K: Resource,
    QueueErr: std::error::Error + 'static,
{
    match result {
        Ok((obj, _)) => {
            info!(
                controller.name = controller_name,
                object = %obj,
                "Reconciled object"
            );
        }
        Err(err) => {
            error!(
                controller.name = controller_name,
                error = err as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}

/// Watches Custompodcount objects, in `config.namespace` or cluster-wide, and
/// runs reconcile_with for each of them until SIGINT or SIGTERM.
pub async fn run_controller(client: Client, config: ControllerConfig) -> anyhow::Result<()> {
    let crs = match &config.namespace {
        Some(namespace) => Api::<Custompodcount>::namespaced(client.clone(), namespace),
        None => Api::<Custompodcount>::all(client.clone()),
    };
    let data = Arc::new(Data::new(KubeCluster::new(client), config));

    info!(controller.name = CONTROLLER_NAME, "Starting controller");
    // Only the Custompodcount kind is watched; instance changes are picked up
    // by the periodic requeue. Status writes leave the generation alone, so the
    // filter keeps a cycle's own status patch from triggering the next cycle.
    let (reader, writer) = reflector::store();
    let records = watcher(crs, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);
    Controller::for_stream(records, reader)
        .shutdown_on_signal()
        .run(
            reconcile_with::<KubeCluster>,
            error_policy::<KubeCluster>,
            data,
        )
        .for_each(|res| async move { report_controller_reconciled(CONTROLLER_NAME, &res) })
        .await;
    info!(controller.name = CONTROLLER_NAME, "Controller terminated");
    Ok(())
}
