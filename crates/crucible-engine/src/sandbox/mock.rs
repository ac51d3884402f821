use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use crucible_core::record::RunStatus;

use crate::stream_hub::RunSink;

use super::{RunSpec, SandboxResult};

/// One scripted sandbox outcome. Files listed in `outputs` are written
/// under the run's `outputs/` directory before the result is returned, so
/// artifact collection sees them exactly as it would after a real run.
#[derive(Debug, Clone)]
pub struct MockOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub wall_ms: u64,
    /// Relative path under `outputs/` and the file body.
    pub outputs: Vec<(String, Vec<u8>)>,
    /// Raw `usage.json` body written into the workdir, when present.
    pub usage_json: Option<String>,
    /// Extra artifact candidates reported verbatim (for escape tests).
    pub extra_candidates: Vec<PathBuf>,
    /// Fail the launch itself instead of producing a result.
    pub launch_error: Option<String>,
    /// Hold the "sandbox" open for this long before finishing, so tests can
    /// attach stream subscribers while the run is in flight.
    pub delay_ms: u64,
}

impl Default for MockOutcome {
    fn default() -> Self {
        Self {
            status: RunStatus::Succeeded,
            exit_code: Some(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
            wall_ms: 1,
            outputs: Vec::new(),
            usage_json: None,
            extra_candidates: Vec::new(),
            launch_error: None,
            delay_ms: 0,
        }
    }
}

impl MockOutcome {
    pub fn succeeded(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    pub fn exited(code: i32) -> Self {
        Self {
            status: if code == 0 {
                RunStatus::Succeeded
            } else {
                RunStatus::Failed
            },
            exit_code: Some(code),
            ..Self::default()
        }
    }
}

/// Test double for the sandbox capability. Pops scripted outcomes in order
/// (falling back to a default success) and records every spec it was given.
#[derive(Debug, Default)]
pub struct MockRunner {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    seen: Mutex<Vec<RunSpec>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: MockOutcome) {
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outcomes.push_back(outcome);
    }

    /// Specs received so far, in order.
    pub fn specs(&self) -> Vec<RunSpec> {
        let seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.clone()
    }

    pub(super) async fn run(
        &self,
        spec: &RunSpec,
        sink: Option<&RunSink>,
    ) -> Result<SandboxResult, anyhow::Error> {
        let outcome = {
            let mut outcomes = match self.outcomes.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            outcomes.pop_front().unwrap_or_default()
        };
        {
            let mut seen = match self.seen.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            seen.push(spec.clone());
        }

        if let Some(message) = outcome.launch_error {
            anyhow::bail!("{message}");
        }

        let started = Instant::now();
        let outputs_dir = spec.workdir.join("outputs");
        let mut candidates = Vec::new();
        for (relative, body) in &outcome.outputs {
            let path = outputs_dir.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, body).await?;
            candidates.push(path);
        }
        if let Some(usage) = &outcome.usage_json {
            tokio::fs::write(spec.workdir.join("usage.json"), usage).await?;
        }
        candidates.extend(outcome.extra_candidates.iter().cloned());

        if outcome.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(outcome.delay_ms)).await;
        }

        if let Some(sink) = sink {
            if !outcome.stdout.is_empty() {
                sink.stdout_chunk(&outcome.stdout);
            }
            if !outcome.stderr.is_empty() {
                sink.stderr_chunk(&outcome.stderr);
            }
        }

        let cap = spec.limits.max_output_bytes as usize;
        let mut stdout = outcome.stdout;
        stdout.truncate(cap);
        let mut stderr = outcome.stderr;
        stderr.truncate(cap);

        // Avoid reporting less wall time than actually elapsed writing files.
        let wall_ms = outcome.wall_ms.max(started.elapsed().as_millis() as u64);

        Ok(SandboxResult {
            status: outcome.status,
            exit_code: outcome.exit_code,
            stdout,
            stderr,
            wall_ms,
            artifact_candidates: candidates,
        })
    }
}
