// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::TargetKey;
use thiserror::Error;

/// Failures reported by the cluster API, reduced to what the reconciler
/// needs to decide between giving up and retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum APIError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("object already exists")]
    ObjectAlreadyExists,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl APIError {
    /// Whether repeating the same request later can succeed without anyone
    /// changing the cluster configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            APIError::Conflict(_)
                | APIError::Timeout(_)
                | APIError::TooManyRequests(_)
                | APIError::InternalError(_)
                | APIError::Transport(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Failed to get Custompodcount {key}: {source}")]
    RecordGetFailed {
        key: TargetKey,
        #[source]
        source: APIError,
    },
    #[error("Failed to list instances for {key}: {source}")]
    InstanceListFailed {
        key: TargetKey,
        #[source]
        source: APIError,
    },
    #[error("Failed to create instance for {key} ({created} created before the failure): {source}")]
    InstanceCreateFailed {
        key: TargetKey,
        created: usize,
        #[source]
        source: APIError,
    },
}
