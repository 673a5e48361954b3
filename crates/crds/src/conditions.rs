//! Cluster API style status conditions
//!
//! Conditions carry a tri-state status plus a severity and a reason code, so
//! a `False` condition can say whether it is waiting (Info) or broken
//! (Warning/Error). Helpers here keep `lastTransitionTime` stable while the
//! status does not change, which keeps status patches idempotent.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Condition types
pub const READY_CONDITION: &str = "Ready";
pub const CLUSTER_SECURITY_GROUPS_READY_CONDITION: &str = "ClusterSecurityGroupsReady";
pub const BASTION_HOST_READY_CONDITION: &str = "BastionHostReady";
pub const LOAD_BALANCER_READY_CONDITION: &str = "LoadBalancerReady";

// Reasons
pub const SECURITY_GROUP_RECONCILIATION_FAILED_REASON: &str = "SecurityGroupReconciliationFailed";
pub const BASTION_HOST_FAILED_REASON: &str = "BastionHostFailed";
pub const LOAD_BALANCER_FAILED_REASON: &str = "LoadBalancerFailed";
pub const WAIT_FOR_DNS_NAME_REASON: &str = "WaitForDNSName";
pub const WAIT_FOR_DNS_NAME_RESOLVE_REASON: &str = "WaitForDNSNameResolve";
pub const DELETING_REASON: &str = "Deleting";
pub const DELETED_REASON: &str = "Deleted";
pub const DELETION_FAILED_REASON: &str = "DeletionFailed";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// How bad a `False` condition is. `None` is used for `True` conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConditionSeverity {
    #[default]
    #[serde(rename = "")]
    None,
    Info,
    Warning,
    Error,
}

impl ConditionSeverity {
    fn is_none(&self) -> bool {
        *self == ConditionSeverity::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "ConditionSeverity::is_none")]
    pub severity: ConditionSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// A `True` condition of the given type.
    pub fn true_condition(condition_type: &str) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: ConditionStatus::True,
            severity: ConditionSeverity::None,
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    /// A `False` condition with reason, severity and message.
    pub fn false_condition(
        condition_type: &str,
        reason: &str,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            r#type: condition_type.to_string(),
            status: ConditionStatus::False,
            severity,
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: (!message.is_empty()).then_some(message),
        }
    }

    /// An `Unknown` condition.
    pub fn unknown_condition(condition_type: &str, reason: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            r#type: condition_type.to_string(),
            status: ConditionStatus::Unknown,
            severity: ConditionSeverity::None,
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: (!message.is_empty()).then_some(message),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Looks up a condition by type.
pub fn get<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Sets or updates a condition, preserving `lastTransitionTime` when the
/// status has not changed.
pub fn set(conditions: &mut Vec<Condition>, mut new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status == new.status {
            existing.severity = new.severity;
            existing.reason = new.reason;
            existing.message = new.message;
        } else {
            new.last_transition_time = Some(Utc::now());
            *existing = new;
        }
    } else {
        if new.last_transition_time.is_none() {
            new.last_transition_time = Some(Utc::now());
        }
        conditions.push(new);
    }
}

pub fn mark_true(conditions: &mut Vec<Condition>, condition_type: &str) {
    set(conditions, Condition::true_condition(condition_type));
}

pub fn mark_false(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    reason: &str,
    severity: ConditionSeverity,
    message: impl Into<String>,
) {
    set(
        conditions,
        Condition::false_condition(condition_type, reason, severity, message),
    );
}

/// Removes a condition by type.
pub fn delete(conditions: &mut Vec<Condition>, condition_type: &str) {
    conditions.retain(|c| c.r#type != condition_type);
}

/// Summarizes `types` into a `Ready` condition.
///
/// Any `False` condition makes the summary `False`, carrying the reason and
/// message of the most severe one (earliest in `types` on ties). Otherwise a
/// missing or `Unknown` condition makes it `Unknown`, and all `True` makes it
/// `True`.
pub fn summarize(conditions: &[Condition], types: &[&str]) -> Condition {
    let mut worst: Option<&Condition> = None;
    let mut pending: Option<&str> = None;

    for condition_type in types {
        match get(conditions, condition_type) {
            Some(c) if c.status == ConditionStatus::False => {
                if worst.is_none_or(|w| c.severity > w.severity) {
                    worst = Some(c);
                }
            }
            Some(c) if c.status == ConditionStatus::True => {}
            _ => {
                pending.get_or_insert(condition_type);
            }
        }
    }

    if let Some(w) = worst {
        return Condition::false_condition(
            READY_CONDITION,
            w.reason.as_deref().unwrap_or_default(),
            w.severity,
            w.message.clone().unwrap_or_default(),
        );
    }
    if let Some(condition_type) = pending {
        return Condition::unknown_condition(
            READY_CONDITION,
            "Pending",
            format!("{condition_type} has not been reported yet"),
        );
    }
    Condition::true_condition(READY_CONDITION)
}
