use clap::{Args, ValueEnum};
use std::num::NonZeroUsize;
use std::time::Duration;

pub const DEFAULT_INSTANCE_LABEL_KEY: &str = "app";
pub const DEFAULT_INSTANCE_LABEL_VALUE: &str = "custompod-count";
pub const DEFAULT_CONTAINER_NAME: &str = "nginx-container";
pub const DEFAULT_IMAGE: &str = "docker.io/library/nginx:latest";

/// How instances are tied to the Custompodcount they were created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LabelScope {
    /// Every target in a namespace shares one label, so targets in the same
    /// namespace count each other's instances.
    Shared,
    /// Instances additionally carry the name of their target.
    PerTarget,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Watch a single namespace instead of the whole cluster.
    pub namespace: Option<String>,
    pub requeue_after: Duration,
    pub error_backoff: Duration,
    pub max_error_backoff: Duration,
    pub image: String,
    pub container_name: String,
    pub label_key: String,
    pub label_value: String,
    pub label_scope: LabelScope,
    pub owner_references: bool,
    pub report_status: bool,
    pub create_concurrency: NonZeroUsize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            namespace: None,
            requeue_after: Duration::from_secs(60),
            error_backoff: Duration::from_secs(10),
            max_error_backoff: Duration::from_secs(300),
            image: DEFAULT_IMAGE.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            label_key: DEFAULT_INSTANCE_LABEL_KEY.to_string(),
            label_value: DEFAULT_INSTANCE_LABEL_VALUE.to_string(),
            label_scope: LabelScope::Shared,
            owner_references: true,
            report_status: true,
            create_concurrency: NonZeroUsize::MIN,
        }
    }
}

/// Command-line flags of `custompodcount-controller run`.
#[derive(Debug, Clone, Args)]
pub struct ControllerArgs {
    /// Only reconcile Custompodcounts in this namespace
    #[arg(long, env = "CUSTOMPODCOUNT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Delay before a successfully reconciled object is reconciled again
    #[arg(long, env = "CUSTOMPODCOUNT_REQUEUE_AFTER_SECS", default_value_t = 60)]
    pub requeue_after_secs: u64,

    /// Requeue delay after the first failed reconciliation; doubles per failure
    #[arg(long, env = "CUSTOMPODCOUNT_ERROR_BACKOFF_SECS", default_value_t = 10)]
    pub error_backoff_secs: u64,

    /// Upper bound of the error backoff
    #[arg(long, env = "CUSTOMPODCOUNT_MAX_ERROR_BACKOFF_SECS", default_value_t = 300)]
    pub max_error_backoff_secs: u64,

    /// Container image of every created instance
    #[arg(long, env = "CUSTOMPODCOUNT_IMAGE", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Container name of every created instance
    #[arg(long, env = "CUSTOMPODCOUNT_CONTAINER_NAME", default_value = DEFAULT_CONTAINER_NAME)]
    pub container_name: String,

    /// Label key set on every instance and used to count them
    #[arg(long, env = "CUSTOMPODCOUNT_LABEL_KEY", default_value = DEFAULT_INSTANCE_LABEL_KEY)]
    pub label_key: String,

    /// Value of the instance label
    #[arg(long, env = "CUSTOMPODCOUNT_LABEL_VALUE", default_value = DEFAULT_INSTANCE_LABEL_VALUE)]
    pub label_value: String,

    /// Whether all Custompodcounts in a namespace share the instance label
    /// (shared) or each one also labels its instances with its own name
    /// (per-target)
    #[arg(long, env = "CUSTOMPODCOUNT_LABEL_SCOPE", value_enum, default_value_t = LabelScope::Shared)]
    pub label_scope: LabelScope,

    /// Make each instance owned by its Custompodcount so it is garbage
    /// collected together with it
    #[arg(long, env = "CUSTOMPODCOUNT_OWNER_REFERENCES", action = clap::ArgAction::Set, default_value_t = true)]
    pub owner_references: bool,

    /// Maintain the Available condition in the Custompodcount status
    #[arg(long, env = "CUSTOMPODCOUNT_REPORT_STATUS", action = clap::ArgAction::Set, default_value_t = true)]
    pub report_status: bool,

    /// Maximum number of instance creations in flight per reconciliation
    #[arg(long, env = "CUSTOMPODCOUNT_CREATE_CONCURRENCY", default_value = "1")]
    pub create_concurrency: NonZeroUsize,
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        ControllerConfig {
            namespace: args.namespace,
            requeue_after: Duration::from_secs(args.requeue_after_secs),
            error_backoff: Duration::from_secs(args.error_backoff_secs),
            max_error_backoff: Duration::from_secs(args.max_error_backoff_secs),
            image: args.image,
            container_name: args.container_name,
            label_key: args.label_key,
            label_value: args.label_value,
            label_scope: args.label_scope,
            owner_references: args.owner_references,
            report_status: args.report_status,
            create_concurrency: args.create_concurrency,
        }
    }
}
