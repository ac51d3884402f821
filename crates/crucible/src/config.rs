use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use rand::Rng as _;
use url::Url;

use crucible_config::{Config, SandboxConfig, parse_api_keys, parse_images};
use crucible_core::limits::{LimitsPolicy, RunLimits};

#[derive(Debug, Parser)]
#[command(
    name = "crucible",
    version,
    about = "Multi-tenant sandboxed code-execution gateway",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ServerArgs {
    /// Bind host (default: 127.0.0.1).
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), env = "CRUCIBLE_HOST")]
    pub host: IpAddr,

    /// Bind port (default: 8080).
    #[arg(long, default_value_t = 8080, env = "CRUCIBLE_PORT")]
    pub port: u16,

    /// Comma-separated API keys, each `token:label:rps:burst` (label, rps,
    /// and burst optional per entry).
    #[arg(long, env = "CRUCIBLE_API_KEYS", hide_env_values = true)]
    pub api_keys: String,

    /// Per-run workdir root, shared storage visible to the sandboxes.
    #[arg(long, default_value = "/var/lib/crucible/work", env = "CRUCIBLE_WORK_ROOT")]
    pub work_root: PathBuf,

    /// Content-addressed store root for uploads and artifacts.
    #[arg(long, default_value = "/var/lib/crucible/storage", env = "CRUCIBLE_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Public base URL stamped into signed download links
    /// (default: `http://<bind>`).
    #[arg(long, env = "CRUCIBLE_PUBLIC_BASE_URL")]
    pub public_base_url: Option<Url>,

    /// HMAC key for signed download URLs.
    #[arg(long, env = "CRUCIBLE_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Generate a fresh signing key at boot. Signed URLs stop verifying
    /// across restarts; development only.
    #[arg(long, env = "CRUCIBLE_EPHEMERAL_SIGNING_KEY")]
    pub ephemeral_signing_key: bool,

    /// Signed download URL lifetime in seconds (default: 600).
    #[arg(
        long,
        default_value_t = crucible_config::DEFAULT_SIGNED_URL_TTL_SECONDS,
        env = "CRUCIBLE_SIGNED_URL_TTL_SECONDS"
    )]
    pub signed_url_ttl_seconds: i64,

    /// Default refill rate for API keys without an explicit `rps`.
    #[arg(long, default_value_t = crucible_config::DEFAULT_RATE_RPS, env = "CRUCIBLE_DEFAULT_RPS")]
    pub default_rps: f64,

    /// Default burst for API keys without an explicit `burst`.
    #[arg(long, default_value_t = crucible_config::DEFAULT_RATE_BURST, env = "CRUCIBLE_DEFAULT_BURST")]
    pub default_burst: f64,

    /// docker-compatible CLI used to launch sandbox containers.
    #[arg(long, default_value = "docker", env = "CRUCIBLE_RUNTIME")]
    pub runtime: String,

    /// Comma-separated `lang=image` overrides for the sandbox images.
    #[arg(long, env = "CRUCIBLE_SANDBOX_IMAGES")]
    pub sandbox_images: Option<String>,

    /// Seccomp profile applied to every sandbox.
    #[arg(long, env = "CRUCIBLE_SECCOMP_PROFILE")]
    pub seccomp_profile: Option<PathBuf>,

    /// AppArmor profile name applied to every sandbox.
    #[arg(long, env = "CRUCIBLE_APPARMOR_PROFILE")]
    pub apparmor_profile: Option<String>,

    /// Drop the seccomp/AppArmor profiles (development hosts only); network,
    /// filesystem, and capability isolation stay on.
    #[arg(long, env = "CRUCIBLE_DISABLE_SANDBOX_SECURITY")]
    pub disable_sandbox_security: bool,

    /// Process cap inside each sandbox.
    #[arg(long, default_value_t = 128, env = "CRUCIBLE_PIDS_LIMIT")]
    pub pids_limit: u32,

    #[command(flatten)]
    pub limits: LimitsArgs,
}

/// Per-installation run limits: defaults applied when a request omits a
/// field, maximums requests may never exceed.
#[derive(Debug, Args, Clone)]
pub struct LimitsArgs {
    #[arg(long, default_value_t = 5_000, env = "CRUCIBLE_DEFAULT_TIMEOUT_MS")]
    pub default_timeout_ms: u64,
    #[arg(long, default_value_t = 60_000, env = "CRUCIBLE_MAX_TIMEOUT_MS")]
    pub max_timeout_ms: u64,

    #[arg(long, default_value_t = 128, env = "CRUCIBLE_DEFAULT_MEMORY_MIB")]
    pub default_memory_mib: u64,
    #[arg(long, default_value_t = 1_024, env = "CRUCIBLE_MAX_MEMORY_MIB")]
    pub max_memory_mib: u64,

    #[arg(long, default_value_t = 5_000, env = "CRUCIBLE_DEFAULT_CPU_MS")]
    pub default_cpu_ms: u64,
    #[arg(long, default_value_t = 60_000, env = "CRUCIBLE_MAX_CPU_MS")]
    pub max_cpu_ms: u64,

    #[arg(long, default_value_t = 64 * 1024, env = "CRUCIBLE_DEFAULT_OUTPUT_BYTES")]
    pub default_output_bytes: u64,
    #[arg(long, default_value_t = 1024 * 1024, env = "CRUCIBLE_MAX_OUTPUT_BYTES")]
    pub max_output_bytes: u64,

    #[arg(long, default_value_t = 10 * 1024 * 1024, env = "CRUCIBLE_DEFAULT_ARTIFACT_BYTES")]
    pub default_artifact_bytes: u64,
    #[arg(long, default_value_t = 100 * 1024 * 1024, env = "CRUCIBLE_MAX_ARTIFACT_BYTES")]
    pub max_artifact_bytes: u64,

    #[arg(long, default_value_t = 10, env = "CRUCIBLE_DEFAULT_ARTIFACT_FILES")]
    pub default_artifact_files: u64,
    #[arg(long, default_value_t = 100, env = "CRUCIBLE_MAX_ARTIFACT_FILES")]
    pub max_artifact_files: u64,
}

impl LimitsArgs {
    fn into_policy(self) -> LimitsPolicy {
        LimitsPolicy {
            defaults: RunLimits {
                timeout_ms: self.default_timeout_ms,
                memory_mib: self.default_memory_mib,
                cpu_ms: self.default_cpu_ms,
                max_output_bytes: self.default_output_bytes,
                max_artifact_bytes: self.default_artifact_bytes,
                max_artifact_files: self.default_artifact_files,
            },
            maximums: RunLimits {
                timeout_ms: self.max_timeout_ms,
                memory_mib: self.max_memory_mib,
                cpu_ms: self.max_cpu_ms,
                max_output_bytes: self.max_output_bytes,
                max_artifact_bytes: self.max_artifact_bytes,
                max_artifact_files: self.max_artifact_files,
            },
        }
    }
}

impl ServerArgs {
    pub fn into_config(self) -> Result<Config, anyhow::Error> {
        let bind = SocketAddr::new(self.host, self.port);

        let api_keys = parse_api_keys(&self.api_keys)?;

        let signing_key = match (self.signing_key, self.ephemeral_signing_key) {
            (Some(key), _) if !key.trim().is_empty() => key.into_bytes(),
            (_, true) => {
                let mut key = vec![0u8; 32];
                rand::rng().fill_bytes(&mut key);
                tracing::warn!(
                    "using an ephemeral signing key; signed URLs will not survive a restart"
                );
                key
            }
            _ => anyhow::bail!(
                "missing signing key: set CRUCIBLE_SIGNING_KEY or pass --ephemeral-signing-key"
            ),
        };

        let public_base_url = match self.public_base_url {
            Some(url) => url,
            None => Url::parse(&format!("http://{bind}"))?,
        };

        let images = match self.sandbox_images.as_deref() {
            Some(raw) => parse_images(raw)?,
            None => crucible_config::default_images(),
        };

        Ok(Config {
            bind,
            work_root: self.work_root,
            storage_root: self.storage_root,
            public_base_url,
            signing_key,
            signed_url_ttl_seconds: self.signed_url_ttl_seconds,
            api_keys,
            default_rps: self.default_rps,
            default_burst: self.default_burst,
            limits: self.limits.into_policy(),
            sandbox: SandboxConfig {
                runtime_bin: self.runtime,
                images,
                seccomp_profile: self.seccomp_profile,
                apparmor_profile: self.apparmor_profile,
                disable_security: self.disable_sandbox_security,
                pids_limit: self.pids_limit,
            },
        })
    }
}

#[derive(Debug, Args, Clone)]
pub struct LoggingArgs {
    /// Logging filter (same syntax as RUST_LOG), e.g. `info`,
    /// `crucible=debug,tower_http=warn`.
    #[arg(long, env = "CRUCIBLE_LOG")]
    pub log: Option<String>,

    /// Optional log file path. When set, logs are written to both console
    /// and file.
    #[arg(long, env = "CRUCIBLE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log rotation for `--log-file` (default: daily).
    #[arg(long, env = "CRUCIBLE_LOG_ROTATION", value_enum, default_value_t = LogRotation::Daily)]
    pub log_rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}
