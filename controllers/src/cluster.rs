// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::{Custompodcount, CustompodcountStatus, TargetKey};
use crate::error::APIError;
use crate::instance::InstanceSelector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    core::ErrorResponse,
    Client,
};

/// The requests the reconciler sends to the cluster API.
///
/// `KubeCluster` forwards them to a real API server; the executable model
/// in `crate::executable_model` serves them from memory.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_record(&self, key: &TargetKey) -> Result<Custompodcount, APIError>;

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<Pod>, APIError>;

    async fn create_instance(&self, namespace: &str, pod: &Pod) -> Result<Pod, APIError>;

    async fn patch_record_status(
        &self,
        key: &TargetKey,
        status: &CustompodcountStatus,
    ) -> Result<(), APIError>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        KubeCluster { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_record(&self, key: &TargetKey) -> Result<Custompodcount, APIError> {
        // A quorum read, not the watch cache, so that the count we act on is
        // the latest one the user wrote.
        let api = Api::<Custompodcount>::namespaced(self.client.clone(), &key.namespace);
        api.get(&key.name)
            .await
            .map_err(|e| kube_error_to_api_error(&e))
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Vec<Pod>, APIError> {
        let api = Api::<Pod>::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&selector.to_string());
        api.list(&lp)
            .await
            .map(|list| list.items)
            .map_err(|e| kube_error_to_api_error(&e))
    }

    async fn create_instance(&self, namespace: &str, pod: &Pod) -> Result<Pod, APIError> {
        let api = Api::<Pod>::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), pod)
            .await
            .map_err(|e| kube_error_to_api_error(&e))
    }

    async fn patch_record_status(
        &self,
        key: &TargetKey,
        status: &CustompodcountStatus,
    ) -> Result<(), APIError> {
        let api = Api::<Custompodcount>::namespaced(self.client.clone(), &key.namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| kube_error_to_api_error(&e))
    }
}

/// Translates errors from kube-rs into `APIError`, by reason first and by
/// status code when the reason is not one we know.
pub fn kube_error_to_api_error(error: &kube::Error) -> APIError {
    match error {
        kube::Error::Api(error_resp) => error_response_to_api_error(error_resp),
        kube::Error::HyperError(e) => APIError::Transport(e.to_string()),
        kube::Error::Service(e) => APIError::Transport(e.to_string()),
        other => APIError::Other(other.to_string()),
    }
}

fn error_response_to_api_error(resp: &ErrorResponse) -> APIError {
    let message = resp.message.clone();
    match resp.reason.as_str() {
        "NotFound" => APIError::ObjectNotFound,
        "AlreadyExists" => APIError::ObjectAlreadyExists,
        "Conflict" => APIError::Conflict(message),
        "BadRequest" => APIError::BadRequest(message),
        "Invalid" => APIError::Invalid(message),
        "Forbidden" | "Unauthorized" => APIError::Forbidden(message),
        "Timeout" | "ServerTimeout" => APIError::Timeout(message),
        "TooManyRequests" => APIError::TooManyRequests(message),
        "InternalError" | "ServiceUnavailable" => APIError::InternalError(message),
        _ => match resp.code {
            404 => APIError::ObjectNotFound,
            409 => APIError::Conflict(message),
            400 => APIError::BadRequest(message),
            422 => APIError::Invalid(message),
            401 | 403 => APIError::Forbidden(message),
            408 | 504 => APIError::Timeout(message),
            429 => APIError::TooManyRequests(message),
            code if code >= 500 => APIError::InternalError(message),
            _ => APIError::Other(message),
        },
    }
}
