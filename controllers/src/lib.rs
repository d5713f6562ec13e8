// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
//! A controller that keeps the number of pods labeled for a `Custompodcount`
//! at the count the resource declares.
//!
//! `reconciler::reconcile` is the whole decision: read the record, count the
//! matching pods, create the missing ones, requeue. `controller_runtime` hooks
//! it into kube-rs, and `executable_model` serves the same requests from
//! memory for tests.
pub mod cluster;
pub mod conditions;
pub mod config;
pub mod controller_runtime;
pub mod crds;
pub mod error;
pub mod executable_model;
pub mod instance;
pub mod reconciler;

#[cfg(test)]
pub mod unit_tests;
