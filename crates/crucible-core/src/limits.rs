use serde::{Deserialize, Serialize};

use crate::error::InvalidRequest;

/// Effective resource limits applied to one run. Produced by
/// [`LimitsPolicy::merge`] and treated as immutable downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    pub timeout_ms: u64,
    pub memory_mib: u64,
    pub cpu_ms: u64,
    pub max_output_bytes: u64,
    pub max_artifact_bytes: u64,
    pub max_artifact_files: u64,
}

/// Caller-supplied partial limits. Requests may lower limits, never raise
/// them past the installation maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimitsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_artifact_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_artifact_files: Option<u64>,
}

/// Per-installation defaults and hard maximums.
#[derive(Debug, Clone, Copy)]
pub struct LimitsPolicy {
    pub defaults: RunLimits,
    pub maximums: RunLimits,
}

impl Default for LimitsPolicy {
    fn default() -> Self {
        Self {
            defaults: RunLimits {
                timeout_ms: 5_000,
                memory_mib: 128,
                cpu_ms: 5_000,
                max_output_bytes: 64 * 1024,
                max_artifact_bytes: 10 * 1024 * 1024,
                max_artifact_files: 10,
            },
            maximums: RunLimits {
                timeout_ms: 60_000,
                memory_mib: 1_024,
                cpu_ms: 60_000,
                max_output_bytes: 1024 * 1024,
                max_artifact_bytes: 100 * 1024 * 1024,
                max_artifact_files: 100,
            },
        }
    }
}

impl LimitsPolicy {
    /// Merge a caller override against this policy. Missing fields take the
    /// defaults; a zero or above-maximum field fails naming the field.
    pub fn merge(&self, user: Option<&RunLimitsOverride>) -> Result<RunLimits, InvalidRequest> {
        let user = user.copied().unwrap_or_default();
        Ok(RunLimits {
            timeout_ms: merge_field(
                "timeout_ms",
                user.timeout_ms,
                self.defaults.timeout_ms,
                self.maximums.timeout_ms,
            )?,
            memory_mib: merge_field(
                "memory_mib",
                user.memory_mib,
                self.defaults.memory_mib,
                self.maximums.memory_mib,
            )?,
            cpu_ms: merge_field(
                "cpu_ms",
                user.cpu_ms,
                self.defaults.cpu_ms,
                self.maximums.cpu_ms,
            )?,
            max_output_bytes: merge_field(
                "max_output_bytes",
                user.max_output_bytes,
                self.defaults.max_output_bytes,
                self.maximums.max_output_bytes,
            )?,
            max_artifact_bytes: merge_field(
                "max_artifact_bytes",
                user.max_artifact_bytes,
                self.defaults.max_artifact_bytes,
                self.maximums.max_artifact_bytes,
            )?,
            max_artifact_files: merge_field(
                "max_artifact_files",
                user.max_artifact_files,
                self.defaults.max_artifact_files,
                self.maximums.max_artifact_files,
            )?,
        })
    }
}

fn merge_field(
    field: &'static str,
    user: Option<u64>,
    default: u64,
    maximum: u64,
) -> Result<u64, InvalidRequest> {
    let value = user.unwrap_or(default);
    if value == 0 {
        return Err(InvalidRequest::new(field, "must be greater than zero"));
    }
    if value > maximum {
        return Err(InvalidRequest::new(
            field,
            format!("exceeds maximum of {maximum}"),
        ));
    }
    Ok(value)
}

impl RunLimits {
    /// The override that reproduces this exact limits record.
    pub fn as_override(&self) -> RunLimitsOverride {
        RunLimitsOverride {
            timeout_ms: Some(self.timeout_ms),
            memory_mib: Some(self.memory_mib),
            cpu_ms: Some(self.cpu_ms),
            max_output_bytes: Some(self.max_output_bytes),
            max_artifact_bytes: Some(self.max_artifact_bytes),
            max_artifact_files: Some(self.max_artifact_files),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LimitsPolicy, RunLimitsOverride};

    #[test]
    fn empty_override_yields_defaults() {
        let policy = LimitsPolicy::default();
        let merged = policy.merge(None).expect("merge");
        assert_eq!(merged, policy.defaults);
        let merged = policy
            .merge(Some(&RunLimitsOverride::default()))
            .expect("merge");
        assert_eq!(merged, policy.defaults);
    }

    #[test]
    fn merge_is_idempotent() {
        let policy = LimitsPolicy::default();
        let first = policy
            .merge(Some(&RunLimitsOverride {
                timeout_ms: Some(1_000),
                memory_mib: Some(64),
                ..Default::default()
            }))
            .expect("merge");
        let second = policy.merge(Some(&first.as_override())).expect("merge");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_values_above_maximum_naming_the_field() {
        let policy = LimitsPolicy::default();
        let err = policy
            .merge(Some(&RunLimitsOverride {
                timeout_ms: Some(policy.maximums.timeout_ms + 1),
                ..Default::default()
            }))
            .expect_err("must reject");
        assert_eq!(err.field, "timeout_ms");

        let err = policy
            .merge(Some(&RunLimitsOverride {
                max_artifact_files: Some(policy.maximums.max_artifact_files + 1),
                ..Default::default()
            }))
            .expect_err("must reject");
        assert_eq!(err.field, "max_artifact_files");
    }

    #[test]
    fn rejects_zero() {
        let policy = LimitsPolicy::default();
        let err = policy
            .merge(Some(&RunLimitsOverride {
                memory_mib: Some(0),
                ..Default::default()
            }))
            .expect_err("must reject");
        assert_eq!(err.field, "memory_mib");
    }

    #[test]
    fn lowering_is_allowed_raising_is_not() {
        let policy = LimitsPolicy::default();
        let merged = policy
            .merge(Some(&RunLimitsOverride {
                max_output_bytes: Some(128),
                ..Default::default()
            }))
            .expect("merge");
        assert_eq!(merged.max_output_bytes, 128);

        assert!(
            policy
                .merge(Some(&RunLimitsOverride {
                    max_output_bytes: Some(policy.maximums.max_output_bytes + 1),
                    ..Default::default()
                }))
                .is_err()
        );
    }
}
