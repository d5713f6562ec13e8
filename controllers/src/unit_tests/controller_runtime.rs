use super::*;
use crate::config::ControllerConfig;
use crate::controller_runtime::*;
use crate::crds::TargetKey;
use crate::error::{APIError, Error};
use crate::executable_model::ExecutableApiServer;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

fn data(server: ExecutableApiServer) -> Arc<Data<ExecutableApiServer>> {
    Arc::new(Data::new(server, ControllerConfig::default()))
}

#[test]
fn test_backoff_doubles_up_to_the_cap() {
    let backoff = ErrorBackoff::new(Duration::from_secs(10), Duration::from_secs(300));
    let key = TargetKey::new("default", "web");

    let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay(&key).as_secs()).collect();

    assert_eq!(delays, vec![10, 20, 40, 80, 160, 300, 300]);
}

#[test]
fn test_backoff_is_tracked_per_object_and_reset() {
    let backoff = ErrorBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    let web = TargetKey::new("default", "web");
    let api = TargetKey::new("default", "api");

    backoff.next_delay(&web);
    backoff.next_delay(&web);
    assert_eq!(backoff.next_delay(&api), Duration::from_secs(1));
    assert_eq!(backoff.next_delay(&web), Duration::from_secs(4));

    backoff.reset(&web);
    assert_eq!(backoff.next_delay(&web), Duration::from_secs(1));
}

#[test]
fn test_backoff_survives_many_failures() {
    let backoff = ErrorBackoff::new(Duration::from_secs(10), Duration::from_secs(300));
    let key = TargetKey::new("default", "web");
    for _ in 0..100 {
        assert!(backoff.next_delay(&key) <= Duration::from_secs(300));
    }
}

#[tokio::test]
async fn test_reconcile_with_runs_a_cycle_for_the_triggering_object() {
    let (server, key) = server_with_target(2);
    let ctx = data(server);
    let trigger = Arc::new(ctx.cluster.record(&key).unwrap());

    let action = reconcile_with(trigger, ctx.clone()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    assert_eq!(instance_count(&ctx.cluster, &ctx.config, &key), 2);
}

#[tokio::test]
async fn test_reconcile_with_uses_the_stored_record_not_the_event_copy() {
    let (server, key) = server_with_target(1);
    let ctx = data(server);
    // The watch event carried an older target count.
    let stale = Arc::new(custompodcount("default", "web", 5));

    reconcile_with(stale, ctx.clone()).await.unwrap();

    assert_eq!(instance_count(&ctx.cluster, &ctx.config, &key), 1);
}

#[tokio::test]
async fn test_reconcile_with_rejects_objects_without_namespace() {
    let ctx = data(ExecutableApiServer::new());
    let mut cr = custompodcount("default", "web", 1);
    cr.metadata.namespace = None;

    let err = reconcile_with(Arc::new(cr), ctx).await.unwrap_err();

    assert!(matches!(err, Error::MissingObjectKey(".metadata.namespace")));
}

#[tokio::test]
async fn test_error_policy_backs_off_until_a_success() {
    let (server, key) = server_with_target(2);
    let ctx = data(server);
    let trigger = Arc::new(ctx.cluster.record(&key).unwrap());

    ctx.cluster
        .inject_create_fault(0, APIError::InternalError("etcdserver: request timed out".to_string()));
    let err = reconcile_with(trigger.clone(), ctx.clone()).await.unwrap_err();
    assert_eq!(
        error_policy(trigger.clone(), &err, ctx.clone()),
        Action::requeue(Duration::from_secs(10))
    );

    ctx.cluster.inject_get_fault(APIError::Timeout("timeout".to_string()));
    let err = reconcile_with(trigger.clone(), ctx.clone()).await.unwrap_err();
    assert_eq!(
        error_policy(trigger.clone(), &err, ctx.clone()),
        Action::requeue(Duration::from_secs(20))
    );

    reconcile_with(trigger.clone(), ctx.clone()).await.unwrap();
    assert_eq!(instance_count(&ctx.cluster, &ctx.config, &key), 2);

    ctx.cluster
        .inject_create_fault(0, APIError::InternalError("etcdserver: request timed out".to_string()));
    ctx.cluster.set_size_pod(&key, 3).unwrap();
    let err = reconcile_with(trigger.clone(), ctx.clone()).await.unwrap_err();
    assert_eq!(
        error_policy(trigger, &err, ctx),
        Action::requeue(Duration::from_secs(10))
    );
}

#[test]
fn test_error_policy_without_identity_waits_for_change() {
    let ctx = data(ExecutableApiServer::new());
    let mut cr = custompodcount("default", "web", 1);
    cr.metadata.name = None;

    let action = error_policy(
        Arc::new(cr),
        &Error::MissingObjectKey(".metadata.name"),
        ctx,
    );

    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn test_status_writes_do_not_pass_the_watch_filter() {
    use kube::runtime::predicates;

    let (server, key) = server_with_target(2);
    let before = server.record(&key).unwrap();

    crate::reconciler::reconcile(&server, &ControllerConfig::default(), &key)
        .await
        .unwrap();
    let after_status = server.record(&key).unwrap();
    assert!(after_status.status.is_some());
    assert_ne!(
        before.metadata.resource_version,
        after_status.metadata.resource_version
    );
    assert_eq!(
        predicates::generation(&before),
        predicates::generation(&after_status)
    );

    server.set_size_pod(&key, 3).unwrap();
    let after_spec = server.record(&key).unwrap();
    assert_ne!(
        predicates::generation(&after_status),
        predicates::generation(&after_spec)
    );
}
