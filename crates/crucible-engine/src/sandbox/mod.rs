use std::collections::HashMap;
use std::path::PathBuf;

use crucible_core::language::Language;
use crucible_core::limits::RunLimits;
use crucible_core::record::RunStatus;

use crate::stream_hub::RunSink;

mod container;
mod mock;

pub use container::ContainerRunner;
pub use mock::{MockOutcome, MockRunner};

/// Everything the sandbox needs to execute one run. Fully prepared by the
/// orchestrator: the workdir exists, inputs are staged, env is sanitized.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub id: String,
    pub language: Language,
    pub code: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: PathBuf,
    pub limits: RunLimits,
    pub staged_files: Vec<String>,
}

/// What a sandbox execution produced. Stream buffers are already truncated
/// to `max_output_bytes`; artifact candidates are unvetted paths the
/// orchestrator filters and caps.
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub wall_ms: u64,
    pub artifact_candidates: Vec<PathBuf>,
}

/// The sandbox capability the orchestrator depends on: one operation,
/// `run(spec) -> result`. The two implementations share no code; tests
/// install the mock.
#[derive(Debug)]
pub enum SandboxRunner {
    Container(ContainerRunner),
    Mock(MockRunner),
}

impl SandboxRunner {
    pub async fn run(
        &self,
        spec: &RunSpec,
        sink: Option<&RunSink>,
    ) -> Result<SandboxResult, anyhow::Error> {
        match self {
            Self::Container(runner) => runner.run(spec, sink).await,
            Self::Mock(runner) => runner.run(spec, sink).await,
        }
    }
}

/// Map an observed child exit code to the public status, for children that
/// ran to completion (timer and shutdown kills are classified upstream).
fn status_for_exit(code: Option<i32>) -> RunStatus {
    match code {
        Some(0) => RunStatus::Succeeded,
        // 137 = SIGKILL from the kernel OOM killer inside the cgroup.
        Some(137) => RunStatus::Oom,
        // 124 = the bootstrap detected its own deadline and gave up.
        Some(124) => RunStatus::Timeout,
        _ => RunStatus::Failed,
    }
}
