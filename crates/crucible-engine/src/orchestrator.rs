use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crucible_core::env::sanitize_env;
use crucible_core::error::{InvalidRequest, NotFound};
use crucible_core::ids;
use crucible_core::limits::{LimitsPolicy, RunLimits};
use crucible_core::record::{
    ArtifactDescriptor, FileStaging, MAX_CODE_BYTES, MAX_STAGED_FILE_BYTES, MAX_STAGED_TOTAL_BYTES,
    RunRecord, RunRequest, RunStatus, UsageRecord,
};
use crucible_core::sha256_hex;
use crucible_storage::artifact_store::ArtifactStore;
use crucible_storage::run_store::RunStore;

use crate::sandbox::{RunSpec, SandboxResult, SandboxRunner};
use crate::stream_hub::{RunSink, StreamHub};

/// Drives one validated run request through staging, sandbox launch,
/// supervision, result collection, and artifact persistence. All per-run
/// mutable state lives in a single workdir created and destroyed here.
pub struct Orchestrator {
    work_root: PathBuf,
    limits: LimitsPolicy,
    store: Arc<ArtifactStore>,
    runs: Arc<RunStore>,
    runner: Arc<SandboxRunner>,
    hub: Arc<StreamHub>,
}

impl Orchestrator {
    pub fn new(
        work_root: impl Into<PathBuf>,
        limits: LimitsPolicy,
        store: Arc<ArtifactStore>,
        runs: Arc<RunStore>,
        runner: Arc<SandboxRunner>,
        hub: Arc<StreamHub>,
    ) -> Self {
        Self {
            work_root: work_root.into(),
            limits,
            store,
            runs,
            runner,
            hub,
        }
    }

    /// Synchronous run: the caller gets the finished record. Validation and
    /// limit merging run before the id is minted.
    pub async fn create_run(
        &self,
        request: RunRequest,
        tenant: &str,
    ) -> Result<RunRecord, anyhow::Error> {
        validate_request(&request)?;
        let limits = self.limits.merge(request.limits.as_ref())?;
        self.run_pipeline(ids::new_run_id(), request, limits, tenant, None)
            .await
    }

    /// Streaming run: validate and admit up front, return the run id
    /// immediately, and drive the same pipeline in a spawned task that
    /// feeds frames to the hub. The terminal frame carries the exact record
    /// the synchronous path would have returned.
    pub fn submit_streaming(
        self: &Arc<Self>,
        request: RunRequest,
        tenant: &str,
    ) -> Result<String, anyhow::Error> {
        validate_request(&request)?;
        let limits = self.limits.merge(request.limits.as_ref())?;

        let run_id = ids::new_run_id();
        let orchestrator = self.clone();
        let tenant = tenant.to_string();
        let sink = RunSink::new(self.hub.clone(), run_id.clone());
        let id = run_id.clone();
        tokio::spawn(async move {
            let result = orchestrator
                .run_pipeline(id.clone(), request, limits, &tenant, Some(sink.clone()))
                .await;
            match result {
                Ok(record) => sink.complete(record),
                Err(error) => {
                    warn!(run_id = %id, error = %error, "streaming run failed");
                    sink.error(error.to_string());
                }
            }
        });
        Ok(run_id)
    }

    async fn run_pipeline(
        &self,
        run_id: String,
        request: RunRequest,
        limits: RunLimits,
        tenant: &str,
        sink: Option<RunSink>,
    ) -> Result<RunRecord, anyhow::Error> {
        let workdir = self.work_root.join(&run_id);
        tokio::fs::create_dir_all(workdir.join("inputs")).await?;
        tokio::fs::create_dir_all(workdir.join("outputs")).await?;

        info!(
            run_id = %run_id,
            tenant = %tenant,
            language = %request.language,
            "run started"
        );

        let result = self
            .execute(&run_id, &workdir, &request, limits, sink.as_ref())
            .await;

        // Teardown is unconditional; the record is stored only afterwards.
        if let Err(error) = tokio::fs::remove_dir_all(&workdir).await {
            warn!(run_id = %run_id, error = %error, "failed to remove workdir");
        }

        let record = result?;
        self.runs.insert(record.clone());
        info!(
            run_id = %run_id,
            tenant = %tenant,
            status = record.status.as_str(),
            wall_ms = record.usage.wall_ms,
            "run completed"
        );
        Ok(record)
    }

    async fn execute(
        &self,
        run_id: &str,
        workdir: &Path,
        request: &RunRequest,
        limits: RunLimits,
        sink: Option<&RunSink>,
    ) -> Result<RunRecord, anyhow::Error> {
        if let Some(sink) = sink {
            sink.status("staging");
        }
        let staged_files = self.stage_inputs(workdir, &request.files).await?;

        let code_sha256 = sha256_hex(request.code.as_bytes());
        let env = sanitize_env(request.env.as_ref());

        let spec = RunSpec {
            id: run_id.to_string(),
            language: request.language,
            code: request.code.clone(),
            args: request.args.clone(),
            env,
            workdir: workdir.to_path_buf(),
            limits,
            staged_files,
        };

        if let Some(sink) = sink {
            sink.status("running");
        }
        let result = self
            .runner
            .run(&spec, sink)
            .await
            .context("sandbox execution")?;

        let status = classify_status(&result);

        if let Some(sink) = sink {
            sink.status("collecting");
        }
        let artifacts = self
            .collect_artifacts(workdir, &result.artifact_candidates, limits)
            .await?;

        let usage = read_usage(workdir, &result, &limits).await;

        let cap = limits.max_output_bytes as usize;
        let stdout = truncate_lossy(result.stdout, cap);
        let stderr = truncate_lossy(result.stderr, cap);

        Ok(RunRecord {
            id: run_id.to_string(),
            status,
            exit_code: result.exit_code,
            stdout,
            stderr,
            usage,
            artifacts,
            limits,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            language: request.language,
            code_sha256,
        })
    }

    async fn stage_inputs(
        &self,
        workdir: &Path,
        files: &[FileStaging],
    ) -> Result<Vec<String>, anyhow::Error> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store.clone();
        let inputs_dir = workdir.join("inputs");
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || stage_inputs_blocking(&store, &inputs_dir, &files))
            .await?
    }

    async fn collect_artifacts(
        &self,
        workdir: &Path,
        candidates: &[PathBuf],
        limits: RunLimits,
    ) -> Result<Vec<ArtifactDescriptor>, anyhow::Error> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store.clone();
        let outputs_dir = workdir.join("outputs");
        let candidates = candidates.to_vec();
        tokio::task::spawn_blocking(move || {
            collect_artifacts_blocking(&store, &outputs_dir, &candidates, limits)
        })
        .await?
    }
}

fn validate_request(request: &RunRequest) -> Result<(), InvalidRequest> {
    if request.code.is_empty() {
        return Err(InvalidRequest::new("code", "must not be empty"));
    }
    if request.code.len() > MAX_CODE_BYTES {
        return Err(InvalidRequest::new(
            "code",
            format!("exceeds {MAX_CODE_BYTES} bytes"),
        ));
    }
    Ok(())
}

/// The sandbox's status is trusted, with one exception: a claimed success
/// with a non-zero exit code is a failure.
fn classify_status(result: &SandboxResult) -> RunStatus {
    if result.status == RunStatus::Succeeded && result.exit_code != Some(0) {
        return RunStatus::Failed;
    }
    result.status
}

fn stage_inputs_blocking(
    store: &ArtifactStore,
    inputs_dir: &Path,
    files: &[FileStaging],
) -> Result<Vec<String>, anyhow::Error> {
    let mut total = 0u64;
    let mut staged = Vec::with_capacity(files.len());
    for staging in files {
        validate_staging_path(&staging.path)?;
        let upload = store
            .get_upload(&staging.id)?
            .ok_or_else(|| NotFound::new("uploaded file", &staging.id))?;
        if upload.meta.size > MAX_STAGED_FILE_BYTES {
            return Err(InvalidRequest::new(
                "files",
                format!("staged file {} exceeds {MAX_STAGED_FILE_BYTES} bytes", staging.path),
            )
            .into());
        }
        total += upload.meta.size;
        if total > MAX_STAGED_TOTAL_BYTES {
            return Err(InvalidRequest::new(
                "files",
                format!("staged files exceed {MAX_STAGED_TOTAL_BYTES} bytes total"),
            )
            .into());
        }

        let dest = inputs_dir.join(&staging.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&upload.path, &dest)
            .with_context(|| format!("stage {} to {}", staging.id, staging.path))?;
        staged.push(staging.path.clone());
    }
    Ok(staged)
}

fn validate_staging_path(path: &str) -> Result<(), InvalidRequest> {
    let candidate = Path::new(path);
    if path.is_empty() || candidate.is_absolute() {
        return Err(InvalidRequest::new(
            "files",
            format!("staging path must be relative: {path}"),
        ));
    }
    if !candidate
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(InvalidRequest::new(
            "files",
            format!("staging path must not contain '..' segments: {path}"),
        ));
    }
    Ok(())
}

/// Iterate candidates in the order the sandbox reported them: paths outside
/// `outputs/` are dropped silently, and collection stops at the first cap.
fn collect_artifacts_blocking(
    store: &ArtifactStore,
    outputs_dir: &Path,
    candidates: &[PathBuf],
    limits: RunLimits,
) -> Result<Vec<ArtifactDescriptor>, anyhow::Error> {
    let Ok(outputs_root) = outputs_dir.canonicalize() else {
        return Ok(Vec::new());
    };

    let mut descriptors: Vec<ArtifactDescriptor> = Vec::new();
    let mut total = 0u64;
    for candidate in candidates {
        if descriptors.len() as u64 >= limits.max_artifact_files {
            break;
        }
        let Ok(real) = candidate.canonicalize() else {
            continue;
        };
        if !real.starts_with(&outputs_root) {
            continue;
        }
        let Ok(meta) = std::fs::metadata(&real) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        if total + meta.len() > limits.max_artifact_bytes {
            break;
        }

        let descriptor = store.ingest_artifact(&real)?;
        total += descriptor.size;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

#[derive(Debug, Default, Deserialize)]
struct UsageFile {
    #[serde(default)]
    cpu_ms: Option<u64>,
    #[serde(default)]
    peak_rss_mib: Option<u64>,
}

/// Populate the usage record from the bootstrap's `usage.json`. Missing or
/// unreadable files are the common case when the sandbox was killed before
/// finalizing; the effective limits stand in as a conservative upper bound.
async fn read_usage(workdir: &Path, result: &SandboxResult, limits: &RunLimits) -> UsageRecord {
    let file = match tokio::fs::read(workdir.join("usage.json")).await {
        Ok(bytes) => serde_json::from_slice::<UsageFile>(&bytes).unwrap_or_default(),
        Err(_) => UsageFile::default(),
    };
    UsageRecord {
        wall_ms: result.wall_ms,
        cpu_ms: file.cpu_ms.unwrap_or(limits.cpu_ms),
        peak_rss_mib: file.peak_rss_mib.unwrap_or(limits.memory_mib),
    }
}

fn truncate_lossy(mut bytes: Vec<u8>, cap: usize) -> String {
    bytes.truncate(cap);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use url::Url;

    use crucible_core::error::{InvalidRequest, NotFound};
    use crucible_core::language::Language;
    use crucible_core::limits::{LimitsPolicy, RunLimitsOverride};
    use crucible_core::record::{FileStaging, RunRequest, RunStatus};
    use crucible_storage::artifact_store::ArtifactStore;
    use crucible_storage::run_store::RunStore;
    use crucible_storage::signed_url::UrlSigner;

    use crate::sandbox::{MockOutcome, MockRunner, SandboxRunner};
    use crate::stream_hub::{Frame, StreamHub};

    use super::{Orchestrator, validate_staging_path};

    struct Fixture {
        _work: TempDir,
        _storage: TempDir,
        orchestrator: Arc<Orchestrator>,
        runner: Arc<SandboxRunner>,
        runs: Arc<RunStore>,
        hub: Arc<StreamHub>,
        work_root: std::path::PathBuf,
        store: Arc<ArtifactStore>,
    }

    fn fixture(runner: MockRunner) -> Fixture {
        let work = TempDir::new().expect("work root");
        let storage = TempDir::new().expect("storage root");
        let signer = UrlSigner::new(
            b"test-key".to_vec(),
            Url::parse("http://localhost:8080").expect("base url"),
        );
        let store =
            Arc::new(ArtifactStore::open(storage.path(), signer, 600).expect("open store"));
        let runs = Arc::new(RunStore::new());
        let hub = Arc::new(StreamHub::new());
        let runner = Arc::new(SandboxRunner::Mock(runner));
        let orchestrator = Arc::new(Orchestrator::new(
            work.path(),
            LimitsPolicy::default(),
            store.clone(),
            runs.clone(),
            runner.clone(),
            hub.clone(),
        ));
        Fixture {
            work_root: work.path().to_path_buf(),
            _work: work,
            _storage: storage,
            orchestrator,
            runner,
            runs,
            hub,
            store,
        }
    }

    fn request(code: &str) -> RunRequest {
        RunRequest {
            language: Language::Python,
            code: code.to_string(),
            args: Vec::new(),
            files: Vec::new(),
            limits: None,
            env: None,
        }
    }

    #[tokio::test]
    async fn happy_path_produces_a_stored_record() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome::succeeded("2\n")]));
        let record = fx
            .orchestrator
            .create_run(request("print(1+1)"), "alice")
            .await
            .expect("run");

        assert!(record.id.starts_with("run_"));
        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.stdout.starts_with('2'));
        assert!(record.artifacts.is_empty());
        assert_eq!(record.language, Language::Python);
        assert_eq!(record.code_sha256.len(), 64);

        let stored = fx.runs.get(&record.id).expect("stored");
        assert_eq!(stored.id, record.id);

        assert!(
            !fx.work_root.join(&record.id).exists(),
            "workdir must be removed"
        );
    }

    #[tokio::test]
    async fn claimed_success_with_nonzero_exit_is_failed() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome {
            exit_code: Some(3),
            ..MockOutcome::default()
        }]));
        let record = fx
            .orchestrator
            .create_run(request("exit 3"), "alice")
            .await
            .expect("run");
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.exit_code, Some(3));
    }

    #[tokio::test]
    async fn sandbox_statuses_pass_through() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome {
            status: RunStatus::Oom,
            exit_code: Some(137),
            ..MockOutcome::default()
        }]));
        let record = fx
            .orchestrator
            .create_run(request("allocate"), "alice")
            .await
            .expect("run");
        assert_eq!(record.status, RunStatus::Oom);
        assert_eq!(record.exit_code, Some(137));
    }

    #[tokio::test]
    async fn empty_and_oversized_code_are_rejected() {
        let fx = fixture(MockRunner::new());
        let err = fx
            .orchestrator
            .create_run(request(""), "alice")
            .await
            .expect_err("reject empty");
        let invalid = err.downcast_ref::<InvalidRequest>().expect("typed");
        assert_eq!(invalid.field, "code");

        let big = "x".repeat(200 * 1024 + 1);
        let err = fx
            .orchestrator
            .create_run(request(&big), "alice")
            .await
            .expect_err("reject oversized");
        assert!(err.downcast_ref::<InvalidRequest>().is_some());
    }

    #[tokio::test]
    async fn artifacts_are_collected_and_signed() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome {
            outputs: vec![("report.txt".to_string(), b"ok".to_vec())],
            ..MockOutcome::default()
        }]));
        let record = fx
            .orchestrator
            .create_run(request("write report"), "alice")
            .await
            .expect("run");

        assert_eq!(record.artifacts.len(), 1);
        let artifact = &record.artifacts[0];
        assert_eq!(artifact.name, "report.txt");
        assert_eq!(artifact.size, 2);
        assert!(artifact.url.contains("payload="));

        let id = artifact
            .url
            .split("/v1/files/")
            .nth(1)
            .and_then(|rest| rest.split('?').next())
            .expect("file id");
        let stored = fx.store.open_payload(id).expect("open").expect("present");
        assert_eq!(std::fs::read(&stored.path).expect("payload"), b"ok");
    }

    #[tokio::test]
    async fn escaping_candidates_are_dropped_silently() {
        let outside = TempDir::new().expect("outside");
        let escape = outside.path().join("escape.txt");
        std::fs::write(&escape, b"secret").expect("write");

        let fx = fixture(MockRunner::with_outcomes([MockOutcome {
            outputs: vec![("good.txt".to_string(), b"fine".to_vec())],
            extra_candidates: vec![escape.clone(), outside.path().join("missing.txt")],
            ..MockOutcome::default()
        }]));
        let record = fx
            .orchestrator
            .create_run(request("write"), "alice")
            .await
            .expect("run");

        assert_eq!(record.artifacts.len(), 1);
        assert_eq!(record.artifacts[0].name, "good.txt");
        assert!(escape.exists(), "escaping file must not be ingested");
    }

    #[tokio::test]
    async fn artifact_count_and_byte_caps_stop_collection() {
        let fx = fixture(MockRunner::with_outcomes([
            MockOutcome {
                outputs: vec![
                    ("a.txt".to_string(), b"aa".to_vec()),
                    ("b.txt".to_string(), b"bb".to_vec()),
                    ("c.txt".to_string(), b"cc".to_vec()),
                ],
                ..MockOutcome::default()
            },
            MockOutcome {
                outputs: vec![
                    ("big.bin".to_string(), vec![0u8; 600]),
                    ("more.bin".to_string(), vec![0u8; 600]),
                ],
                ..MockOutcome::default()
            },
        ]));

        let mut req = request("write many");
        req.limits = Some(RunLimitsOverride {
            max_artifact_files: Some(2),
            ..Default::default()
        });
        let record = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect("run");
        assert_eq!(record.artifacts.len(), 2);

        let mut req = request("write big");
        req.limits = Some(RunLimitsOverride {
            max_artifact_bytes: Some(1_000),
            ..Default::default()
        });
        let record = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect("run");
        assert_eq!(record.artifacts.len(), 1);
        assert!(record.artifacts.iter().map(|a| a.size).sum::<u64>() <= 1_000);
    }

    #[tokio::test]
    async fn streams_are_truncated_to_the_cap() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome {
            stdout: vec![b'x'; 4096],
            stderr: vec![b'e'; 4096],
            ..MockOutcome::default()
        }]));
        let mut req = request("spam");
        req.limits = Some(RunLimitsOverride {
            max_output_bytes: Some(128),
            ..Default::default()
        });
        let record = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect("run");
        assert_eq!(record.stdout.len(), 128);
        assert_eq!(record.stderr.len(), 128);
    }

    #[tokio::test]
    async fn staged_files_reach_the_sandbox_inputs() {
        let fx = fixture(MockRunner::new());
        let meta = fx
            .store
            .save_upload("input.txt", "text/plain", b"hello")
            .expect("upload");

        let mut req = request("read input");
        req.files = vec![FileStaging {
            id: meta.id.clone(),
            path: "dataset/input.txt".to_string(),
        }];
        let record = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect("run");
        assert_eq!(record.status, RunStatus::Succeeded);

        let SandboxRunner::Mock(mock) = fx.runner.as_ref() else {
            unreachable!()
        };
        let specs = mock.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].staged_files, vec!["dataset/input.txt".to_string()]);
    }

    #[tokio::test]
    async fn staging_rejects_escapes_and_unknown_ids() {
        let fx = fixture(MockRunner::new());
        let mut req = request("x");
        req.files = vec![FileStaging {
            id: "file_aaaaaaaaaaaa".to_string(),
            path: "../escape".to_string(),
        }];
        let err = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect_err("reject traversal");
        assert!(err.downcast_ref::<InvalidRequest>().is_some());

        let mut req = request("x");
        req.files = vec![FileStaging {
            id: "file_aaaaaaaaaaaa".to_string(),
            path: "ok.txt".to_string(),
        }];
        let err = fx
            .orchestrator
            .create_run(req, "alice")
            .await
            .expect_err("reject unknown id");
        assert!(err.downcast_ref::<NotFound>().is_some());
    }

    #[tokio::test]
    async fn workdir_is_removed_even_when_staging_fails() {
        let fx = fixture(MockRunner::new());
        let mut req = request("x");
        req.files = vec![FileStaging {
            id: "file_aaaaaaaaaaaa".to_string(),
            path: "/etc/passwd".to_string(),
        }];
        let _ = fx.orchestrator.create_run(req, "alice").await;

        let leftovers: Vec<_> = std::fs::read_dir(&fx.work_root)
            .expect("read work root")
            .collect();
        assert!(leftovers.is_empty(), "workdir must be torn down on failure");
    }

    #[tokio::test]
    async fn usage_comes_from_usage_json_with_limit_fallback() {
        let fx = fixture(MockRunner::with_outcomes([
            MockOutcome {
                usage_json: Some(r#"{"cpu_ms": 42, "peak_rss_mib": 7, "wall_ms": 55}"#.to_string()),
                wall_ms: 60,
                ..MockOutcome::default()
            },
            MockOutcome {
                status: RunStatus::Timeout,
                exit_code: None,
                wall_ms: 1_000,
                ..MockOutcome::default()
            },
        ]));

        let record = fx
            .orchestrator
            .create_run(request("a"), "alice")
            .await
            .expect("run");
        assert_eq!(record.usage.cpu_ms, 42);
        assert_eq!(record.usage.peak_rss_mib, 7);
        assert_eq!(record.usage.wall_ms, 60);

        let record = fx
            .orchestrator
            .create_run(request("b"), "alice")
            .await
            .expect("run");
        assert_eq!(record.usage.cpu_ms, record.limits.cpu_ms);
        assert_eq!(record.usage.peak_rss_mib, record.limits.memory_mib);
        assert_eq!(record.usage.wall_ms, 1_000);
    }

    #[tokio::test]
    async fn streaming_emits_frames_then_complete() {
        let fx = fixture(MockRunner::with_outcomes([MockOutcome::succeeded("out\n")]));
        let run_id = fx
            .orchestrator
            .submit_streaming(request("print"), "alice")
            .expect("submit");
        assert!(run_id.starts_with("run_"));

        // Current-thread runtime: the pipeline task has not run yet, so
        // attaching now observes every frame.
        let mut rx = fx.hub.attach(&run_id);

        let mut kinds = Vec::new();
        while let Some(frame) = rx.recv().await {
            let terminal = matches!(frame, Frame::Complete { .. } | Frame::Error { .. });
            kinds.push(frame);
            if terminal {
                break;
            }
        }

        assert!(matches!(kinds.first(), Some(Frame::Connected { .. })));
        let complete = kinds.last().expect("terminal frame");
        let Frame::Complete { record } = complete else {
            panic!("expected complete frame");
        };
        assert_eq!(record.id, run_id);
        assert_eq!(record.status, RunStatus::Succeeded);
        assert!(
            kinds
                .iter()
                .any(|frame| matches!(frame, Frame::Stdout { .. })),
            "stdout frames precede complete"
        );
        assert!(fx.runs.get(&run_id).is_some(), "record stored for later fetch");
    }

    #[tokio::test]
    async fn streaming_rejects_invalid_requests_synchronously() {
        let fx = fixture(MockRunner::new());
        let err = fx
            .orchestrator
            .submit_streaming(request(""), "alice")
            .expect_err("reject");
        assert!(err.downcast_ref::<InvalidRequest>().is_some());
    }

    #[test]
    fn staging_path_validation() {
        assert!(validate_staging_path("dataset/input.txt").is_ok());
        assert!(validate_staging_path("a.txt").is_ok());
        assert!(validate_staging_path("").is_err());
        assert!(validate_staging_path("/etc/passwd").is_err());
        assert!(validate_staging_path("../escape").is_err());
        assert!(validate_staging_path("a/../../b").is_err());
        assert!(validate_staging_path("./a").is_err());
    }
}
