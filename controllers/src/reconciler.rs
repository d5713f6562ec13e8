// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::cluster::ClusterApi;
use crate::conditions::*;
use crate::config::ControllerConfig;
use crate::crds::{Custompodcount, TargetKey};
use crate::error::{APIError, Error};
use crate::instance::{make_instance, InstanceSelector};
use futures::{future, stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::runtime::controller::Action;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::*;

/// What one pass over a target did, before the result is turned into an
/// `Action` or an `Error`.
struct CycleReport {
    target_count: usize,
    observed: usize,
    created: usize,
    create_error: Option<APIError>,
}

/// Runs one reconciliation cycle for the Custompodcount identified by `key`:
/// read the record, count its instances, create the missing ones, and ask to
/// be invoked again after `config.requeue_after`.
///
/// Nothing is carried over between cycles. A retried cycle re-reads both the
/// record and the instances, so it only creates what is still missing.
#[instrument(skip(cluster, config), fields(object = %key))]
pub async fn reconcile<C>(
    cluster: &C,
    config: &ControllerConfig,
    key: &TargetKey,
) -> Result<Action, Error>
where
    C: ClusterApi + ?Sized,
{
    let cr = match cluster.get_record(key).await {
        Ok(cr) => cr,
        Err(APIError::ObjectNotFound) => {
            info!("Custompodcount not found, end reconcile");
            return Ok(Action::await_change());
        }
        Err(err) if err.is_retryable() => {
            warn!(error = %err, "Get Custompodcount failed, will retry");
            return Err(Error::RecordGetFailed {
                key: key.clone(),
                source: err,
            });
        }
        Err(err) => {
            error!(error = %err, "Get Custompodcount failed, waiting for the next change");
            return Ok(Action::await_change());
        }
    };

    let selector = InstanceSelector::for_record(config, &cr);
    let observed = match cluster.list_instances(&key.namespace, &selector).await {
        Ok(instances) => instances.len(),
        Err(err) if err.is_retryable() => {
            warn!(error = %err, selector = %selector, "List instances failed, will retry");
            return Err(Error::InstanceListFailed {
                key: key.clone(),
                source: err,
            });
        }
        Err(err) => {
            error!(error = %err, selector = %selector, "List instances failed, waiting for the next change");
            return Ok(Action::await_change());
        }
    };

    let target_count = cr.target_count();
    let deficit = target_count.saturating_sub(observed);
    info!(observed, target_count, deficit, "Counted instances");

    let (created, create_error) = if deficit > 0 {
        create_instances(cluster, config, &cr, &selector, deficit).await
    } else {
        (0, None)
    };

    let report = CycleReport {
        target_count,
        observed,
        created,
        create_error,
    };
    if config.report_status {
        update_status(cluster, key, &cr, &report).await;
    }

    match report.create_error {
        Some(source) => Err(Error::InstanceCreateFailed {
            key: key.clone(),
            created: report.created,
            source,
        }),
        None => Ok(Action::requeue(config.requeue_after)),
    }
}

/// Creates up to `deficit` instances, at most `config.create_concurrency` at
/// a time. No create starts after the first failure, but creates already in
/// flight are awaited, so the returned count covers every committed request.
/// Instances that were created stay.
async fn create_instances<C>(
    cluster: &C,
    config: &ControllerConfig,
    cr: &Custompodcount,
    selector: &InstanceSelector,
    deficit: usize,
) -> (usize, Option<APIError>)
where
    C: ClusterApi + ?Sized,
{
    let failed = AtomicBool::new(false);
    let failed = &failed;
    let namespace = cr.metadata.namespace.as_deref().unwrap_or_default();

    let outcomes: Vec<Result<(), APIError>> = stream::iter(0..deficit)
        .map(|_| async move {
            if failed.load(Ordering::SeqCst) {
                return None;
            }
            let instance = make_instance(config, cr, selector);
            let name = instance.metadata.name.clone().unwrap_or_default();
            match cluster.create_instance(namespace, &instance).await {
                Ok(_) => {
                    info!(instance = %name, "Created instance");
                    Some(Ok(()))
                }
                Err(err) => {
                    failed.store(true, Ordering::SeqCst);
                    error!(instance = %name, error = %err, "Failed to create instance");
                    Some(Err(err))
                }
            }
        })
        .buffer_unordered(config.create_concurrency.get())
        .filter_map(future::ready)
        .collect()
        .await;

    let mut created = 0;
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(()) => created += 1,
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    (created, first_error)
}

fn available_condition(cr: &Custompodcount, report: &CycleReport) -> Condition {
    let generation = cr.metadata.generation;
    let present = report.observed + report.created;
    match &report.create_error {
        Some(err) => new_condition(
            CONDITION_AVAILABLE,
            false,
            REASON_INSTANCE_CREATION_FAILED,
            format!(
                "{} of {} instances present; creating another failed: {}",
                present, report.target_count, err
            ),
            generation,
        ),
        None if report.created > 0 => new_condition(
            CONDITION_AVAILABLE,
            true,
            REASON_INSTANCES_CREATED,
            format!(
                "created {} instances, {} of {} present",
                report.created, present, report.target_count
            ),
            generation,
        ),
        None if report.observed > report.target_count => new_condition(
            CONDITION_AVAILABLE,
            true,
            REASON_TARGET_COUNT_EXCEEDED,
            format!(
                "{} instances present for a target of {}; excess instances are not removed",
                present, report.target_count
            ),
            generation,
        ),
        None => new_condition(
            CONDITION_AVAILABLE,
            true,
            REASON_TARGET_COUNT_REACHED,
            format!("{} of {} instances present", present, report.target_count),
            generation,
        ),
    }
}

/// Writes the Available condition when it differs from what is stored.
/// A failed write is logged and otherwise ignored.
async fn update_status<C>(cluster: &C, key: &TargetKey, cr: &Custompodcount, report: &CycleReport)
where
    C: ClusterApi + ?Sized,
{
    let mut status = cr.status.clone().unwrap_or_default();
    if !set_condition(&mut status.conditions, available_condition(cr, report)) {
        return;
    }
    match cluster.patch_record_status(key, &status).await {
        Ok(()) => debug!("Updated Custompodcount status"),
        Err(err) => warn!(error = %err, "Failed to update Custompodcount status"),
    }
}
