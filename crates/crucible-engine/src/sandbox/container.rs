use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crucible_config::SandboxConfig;
use crucible_core::bootstrap::BootstrapSpec;
use crucible_core::record::RunStatus;

use crate::stream_hub::RunSink;

use super::{RunSpec, SandboxResult, status_for_exit};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Production sandbox: one ephemeral container per run, launched through a
/// docker-compatible CLI with strict isolation flags. The bootstrap inside
/// the image reads the run spec from stdin before user code executes.
#[derive(Debug)]
pub struct ContainerRunner {
    config: SandboxConfig,
    shutdown: CancellationToken,
}

impl ContainerRunner {
    pub fn new(config: SandboxConfig, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    pub(super) async fn run(
        &self,
        spec: &RunSpec,
        sink: Option<&RunSink>,
    ) -> Result<SandboxResult, anyhow::Error> {
        let image = self
            .config
            .images
            .get(&spec.language)
            .ok_or_else(|| anyhow::anyhow!("no sandbox image for language {}", spec.language))?;

        let entry = spec.language.entry_file();
        tokio::fs::write(spec.workdir.join(entry), &spec.code)
            .await
            .context("write entry file")?;

        let name = format!("crucible-{}", spec.id);
        let mut command = Command::new(&self.config.runtime_bin);
        command
            .arg("run")
            .arg("--rm")
            .arg("-i")
            .args(["--name", &name])
            .args(["--network", "none"])
            .arg("--read-only")
            .args(["--cap-drop", "ALL"])
            .args(["--security-opt", "no-new-privileges"]);

        if !self.config.disable_security {
            if let Some(seccomp) = &self.config.seccomp_profile {
                command.arg("--security-opt");
                command.arg(format!("seccomp={}", seccomp.display()));
            }
            if let Some(apparmor) = &self.config.apparmor_profile {
                command.arg("--security-opt");
                command.arg(format!("apparmor={apparmor}"));
            }
        }

        command
            .args(["--pids-limit", &self.config.pids_limit.to_string()])
            .args(["--memory", &format!("{}m", spec.limits.memory_mib)])
            .args(["--memory-swap", &format!("{}m", spec.limits.memory_mib)])
            .args(["--cpus", "1"])
            .arg("-v")
            .arg(format!("{}:/work", spec.workdir.display()))
            .args(["-w", "/work"])
            .arg(image)
            .arg(entry)
            .arg("--")
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(run_id = %spec.id, image = %image, "launching sandbox");
        let started = Instant::now();
        let mut child = command.spawn().context("spawn sandbox runtime")?;

        // The bootstrap reads the spec before touching user code.
        let bootstrap = serde_json::to_vec(&BootstrapSpec {
            id: &spec.id,
            args: &spec.args,
            env: &spec.env,
            limits: &spec.limits,
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&bootstrap).await.context("write bootstrap spec")?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await?;
        }

        let cap = spec.limits.max_output_bytes as usize;
        let stdout_sink = sink.map(|sink| StreamSink {
            sink: sink.clone(),
            kind: StreamKind::Stdout,
        });
        let stderr_sink = sink.map(|sink| StreamSink {
            sink: sink.clone(),
            kind: StreamKind::Stderr,
        });
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain_stream(pipe, cap, stdout_sink)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain_stream(pipe, cap, stderr_sink)));

        let timeout = Duration::from_millis(spec.limits.timeout_ms);
        let mut timed_out = false;
        let mut cancelled = false;
        let exit = tokio::select! {
            status = child.wait() => Some(status.context("wait for sandbox")?),
            _ = tokio::time::sleep(timeout) => {
                timed_out = true;
                None
            }
            _ = self.shutdown.cancelled() => {
                cancelled = true;
                None
            }
        };

        let exit = match exit {
            Some(status) => Some(status),
            None => {
                self.kill_container(&name).await;
                let _ = child.start_kill();
                child.wait().await.ok()
            }
        };

        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let exit_code = exit.and_then(|status| status.code());
        let status = if timed_out {
            RunStatus::Timeout
        } else if cancelled {
            RunStatus::Killed
        } else {
            status_for_exit(exit_code)
        };

        let outputs_dir = spec.workdir.join("outputs");
        let artifact_candidates = tokio::task::spawn_blocking(move || walk_outputs(&outputs_dir))
            .await
            .unwrap_or_default();

        Ok(SandboxResult {
            status,
            exit_code,
            stdout,
            stderr,
            wall_ms: started.elapsed().as_millis() as u64,
            artifact_candidates,
        })
    }

    /// Best-effort kill of the container itself; killing only the CLI client
    /// would leave the sandbox running.
    async fn kill_container(&self, name: &str) {
        let result = Command::new(&self.config.runtime_bin)
            .args(["kill", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;
        if let Err(error) = result {
            warn!(container = %name, error = %error, "failed to kill sandbox container");
        }
    }
}

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// The run sink bound to one stream direction.
#[derive(Clone)]
struct StreamSink {
    sink: RunSink,
    kind: StreamKind,
}

impl StreamSink {
    fn forward(&self, bytes: &[u8]) {
        match self.kind {
            StreamKind::Stdout => self.sink.stdout_chunk(bytes),
            StreamKind::Stderr => self.sink.stderr_chunk(bytes),
        }
    }
}

/// Drain one child pipe to EOF, keeping at most `cap` bytes and forwarding
/// every chunk to the sink. Reading past the cap (and discarding) keeps the
/// child from blocking on a full pipe.
async fn drain_stream(
    mut pipe: impl tokio::io::AsyncRead + Unpin,
    cap: usize,
    sink: Option<StreamSink>,
) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        let n = match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if captured.len() < cap {
            let take = n.min(cap - captured.len());
            captured.extend_from_slice(&buf[..take]);
        }
        if let Some(sink) = &sink {
            sink.forward(&buf[..n]);
        }
    }
    captured
}

/// Depth-first walk of the outputs directory in directory-iteration order.
fn walk_outputs(outputs: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![outputs.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => stack.push(path),
                Ok(kind) if kind.is_file() => found.push(path),
                _ => {}
            }
        }
    }
    found
}
