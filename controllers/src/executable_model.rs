// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::cluster::ClusterApi;
use crate::crds::{Custompodcount, CustompodcountStatus, TargetKey};
use crate::error::APIError;
use crate::instance::InstanceSelector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

// The ExecutableApiServer is an in-memory stand-in for the Kubernetes API
// server, serving exactly the requests ClusterApi issues. Objects are keyed by
// namespace and name, list results come back in name order, and every write
// bumps a global resource version the way the real store does.
//
// Faults are one-shot: an injected fault fails the next matching request and
// is then cleared, so a retried reconciliation sees a healthy server again.
#[derive(Default)]
pub struct ExecutableApiServer {
    state: Mutex<ApiServerState>,
}

#[derive(Default)]
struct ApiServerState {
    records: BTreeMap<TargetKey, Custompodcount>,
    pods: BTreeMap<TargetKey, Pod>,
    resource_version: u64,
    next_uid: u64,
    faults: FaultPlan,
    create_requests: usize,
}

#[derive(Default)]
struct FaultPlan {
    get: Option<APIError>,
    list: Option<APIError>,
    create: Option<(usize, APIError)>,
    patch_status: Option<APIError>,
}

impl ApiServerState {
    fn stamp(&mut self, meta: &mut kube::api::ObjectMeta) {
        self.resource_version += 1;
        meta.resource_version = Some(self.resource_version.to_string());
        if meta.uid.is_none() {
            self.next_uid += 1;
            meta.uid = Some(format!("00000000-0000-0000-0000-{:012}", self.next_uid));
        }
    }
}

fn key_of<K: ResourceExt>(obj: &K) -> Option<TargetKey> {
    Some(TargetKey::new(obj.namespace()?, obj.meta().name.clone()?))
}

impl ExecutableApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ApiServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a Custompodcount as a user would with `kubectl create`.
    pub fn create_record(&self, mut cr: Custompodcount) -> Result<Custompodcount, APIError> {
        let key = key_of(&cr).ok_or_else(|| APIError::Invalid("missing name or namespace".to_string()))?;
        let mut state = self.state();
        if state.records.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        cr.metadata.generation = Some(1);
        state.stamp(&mut cr.metadata);
        state.records.insert(key, cr.clone());
        Ok(cr)
    }

    /// Changes the target count of a stored record; bumps its generation.
    pub fn set_size_pod(&self, key: &TargetKey, size_pod: i32) -> Result<(), APIError> {
        let mut state = self.state();
        let mut cr = state.records.get(key).cloned().ok_or(APIError::ObjectNotFound)?;
        cr.spec.size_pod = Some(size_pod);
        cr.metadata.generation = Some(cr.metadata.generation.unwrap_or(0) + 1);
        state.stamp(&mut cr.metadata);
        state.records.insert(key.clone(), cr);
        Ok(())
    }

    /// Deletes a record. Instances are left alone; there is no garbage
    /// collector in the model.
    pub fn delete_record(&self, key: &TargetKey) -> Result<(), APIError> {
        self.state()
            .records
            .remove(key)
            .map(|_| ())
            .ok_or(APIError::ObjectNotFound)
    }

    pub fn record(&self, key: &TargetKey) -> Option<Custompodcount> {
        self.state().records.get(key).cloned()
    }

    /// Stores a pod created by some other actor.
    pub fn add_pod(&self, mut pod: Pod) -> Result<(), APIError> {
        let key = key_of(&pod).ok_or_else(|| APIError::Invalid("missing name or namespace".to_string()))?;
        let mut state = self.state();
        if state.pods.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        state.stamp(&mut pod.metadata);
        state.pods.insert(key, pod);
        Ok(())
    }

    pub fn delete_pod(&self, key: &TargetKey) -> Result<(), APIError> {
        self.state()
            .pods
            .remove(key)
            .map(|_| ())
            .ok_or(APIError::ObjectNotFound)
    }

    /// Pods in `namespace` matching `selector`, in name order.
    pub fn pods(&self, namespace: &str, selector: &InstanceSelector) -> Vec<Pod> {
        self.state()
            .pods
            .iter()
            .filter(|(key, pod)| key.namespace == namespace && selector.matches(pod.metadata.labels.as_ref()))
            .map(|(_, pod)| pod.clone())
            .collect()
    }

    pub fn pod_count(&self) -> usize {
        self.state().pods.len()
    }

    /// Number of create requests received, successful or not.
    pub fn create_requests(&self) -> usize {
        self.state().create_requests
    }

    pub fn inject_get_fault(&self, err: APIError) {
        self.state().faults.get = Some(err);
    }

    pub fn inject_list_fault(&self, err: APIError) {
        self.state().faults.list = Some(err);
    }

    /// Fails the create request that follows `successes` successful ones.
    pub fn inject_create_fault(&self, successes: usize, err: APIError) {
        self.state().faults.create = Some((successes, err));
    }

    pub fn inject_status_fault(&self, err: APIError) {
        self.state().faults.patch_status = Some(err);
    }
}

#[async_trait]
impl ClusterApi for ExecutableApiServer {
    async fn get_record(&self, key: &TargetKey) -> Result<Custompodcount, APIError> {
        let mut state = self.state();
        if let Some(err) = state.faults.get.take() {
            return Err(err);
        }
        state.records.get(key).cloned().ok_or(APIError::ObjectNotFound)
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<Pod>, APIError> {
        if let Some(err) = self.state().faults.list.take() {
            return Err(err);
        }
        Ok(self.pods(namespace, selector))
    }

    async fn create_instance(&self, namespace: &str, pod: &Pod) -> Result<Pod, APIError> {
        let mut state = self.state();
        state.create_requests += 1;
        match state.faults.create.take() {
            Some((0, err)) => return Err(err),
            Some((successes, err)) => state.faults.create = Some((successes - 1, err)),
            None => {}
        }

        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| APIError::Invalid("metadata.name is required".to_string()))?;
        if pod.metadata.namespace.as_deref().is_some_and(|ns| ns != namespace) {
            return Err(APIError::BadRequest(
                "the namespace of the object does not match the namespace of the request".to_string(),
            ));
        }
        let key = TargetKey::new(namespace, name);
        if state.pods.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }

        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        state.stamp(&mut created.metadata);
        state.pods.insert(key, created.clone());
        Ok(created)
    }

    async fn patch_record_status(
        &self,
        key: &TargetKey,
        status: &CustompodcountStatus,
    ) -> Result<(), APIError> {
        let mut state = self.state();
        if let Some(err) = state.faults.patch_status.take() {
            return Err(err);
        }
        let mut cr = state.records.get(key).cloned().ok_or(APIError::ObjectNotFound)?;
        cr.status = Some(status.clone());
        state.stamp(&mut cr.metadata);
        state.records.insert(key.clone(), cr);
        Ok(())
    }
}
