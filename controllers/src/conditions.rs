use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;

pub const CONDITION_AVAILABLE: &str = "Available";

pub const REASON_INSTANCES_CREATED: &str = "InstancesCreated";
pub const REASON_TARGET_COUNT_REACHED: &str = "TargetCountReached";
pub const REASON_TARGET_COUNT_EXCEEDED: &str = "TargetCountExceeded";
pub const REASON_INSTANCE_CREATION_FAILED: &str = "InstanceCreationFailed";

pub fn new_condition(
    type_: &str,
    status: bool,
    reason: &str,
    message: String,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message,
        observed_generation,
        last_transition_time: Time(Utc::now()),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Merges `new` into `conditions` by type. The transition time of an existing
/// condition only moves when its status flips. Returns whether anything other
/// than the transition time changed.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        None => {
            conditions.push(new);
            true
        }
        Some(existing) => {
            let mut changed = false;
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = new.last_transition_time;
                changed = true;
            }
            if existing.reason != new.reason {
                existing.reason = new.reason;
                changed = true;
            }
            if existing.message != new.message {
                existing.message = new.message;
                changed = true;
            }
            if existing.observed_generation != new.observed_generation {
                existing.observed_generation = new.observed_generation;
                changed = true;
            }
            changed
        }
    }
}
