use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use url::Url;

use crucible_core::language::{ALL_LANGUAGES, Language};
use crucible_core::limits::LimitsPolicy;

pub const DEFAULT_SIGNED_URL_TTL_SECONDS: i64 = 600;
pub const DEFAULT_RATE_RPS: f64 = 5.0;
pub const DEFAULT_RATE_BURST: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub work_root: PathBuf,
    pub storage_root: PathBuf,
    /// Base URL stamped into signed download links.
    pub public_base_url: Url,
    pub signing_key: Vec<u8>,
    pub signed_url_ttl_seconds: i64,
    pub api_keys: Vec<ApiKey>,
    pub default_rps: f64,
    pub default_burst: f64,
    pub limits: LimitsPolicy,
    pub sandbox: SandboxConfig,
}

/// One bearer token and its admission parameters. The label is the tenant
/// identity used in logs and rate-limit keys.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub token: String,
    pub label: String,
    pub rps: Option<f64>,
    pub burst: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// docker-compatible CLI used to launch run containers.
    pub runtime_bin: String,
    pub images: HashMap<Language, String>,
    pub seccomp_profile: Option<PathBuf>,
    pub apparmor_profile: Option<String>,
    /// Development escape hatch: drops the seccomp/AppArmor profiles only.
    pub disable_security: bool,
    pub pids_limit: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime_bin: "docker".to_string(),
            images: default_images(),
            seccomp_profile: None,
            apparmor_profile: None,
            disable_security: false,
            pids_limit: 128,
        }
    }
}

pub fn default_images() -> HashMap<Language, String> {
    ALL_LANGUAGES
        .into_iter()
        .map(|language| (language, format!("crucible-runner-{language}:latest")))
        .collect()
}

/// Parse the `CRUCIBLE_API_KEYS` value: comma-separated entries of
/// `token:label:rps:burst`, with label/rps/burst optional per entry.
pub fn parse_api_keys(raw: &str) -> Result<Vec<ApiKey>, anyhow::Error> {
    let mut keys = Vec::new();
    for (index, entry) in raw.split(',').enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.split(':');
        let token = parts.next().unwrap_or_default().trim();
        if token.is_empty() {
            anyhow::bail!("api key entry {} has an empty token", index + 1);
        }
        let label = match parts.next().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("key{}", index + 1),
        };
        let rps = parse_rate_part(parts.next(), "rps", index)?;
        let burst = parse_rate_part(parts.next(), "burst", index)?;
        if parts.next().is_some() {
            anyhow::bail!(
                "api key entry {} has trailing fields (expected token:label:rps:burst)",
                index + 1
            );
        }
        keys.push(ApiKey {
            token: token.to_string(),
            label,
            rps,
            burst,
        });
    }
    if keys.is_empty() {
        anyhow::bail!("no api keys configured");
    }
    Ok(keys)
}

fn parse_rate_part(
    part: Option<&str>,
    what: &str,
    index: usize,
) -> Result<Option<f64>, anyhow::Error> {
    let Some(part) = part.map(str::trim) else {
        return Ok(None);
    };
    if part.is_empty() {
        return Ok(None);
    }
    let value: f64 = part
        .parse()
        .map_err(|_| anyhow::anyhow!("api key entry {} has invalid {what}: {part}", index + 1))?;
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("api key entry {} has non-positive {what}", index + 1);
    }
    Ok(Some(value))
}

/// Parse the `CRUCIBLE_SANDBOX_IMAGES` value: comma-separated `lang=image`
/// pairs overriding the built-in image names.
pub fn parse_images(raw: &str) -> Result<HashMap<Language, String>, anyhow::Error> {
    let mut images = default_images();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, image)) = pair.split_once('=') else {
            anyhow::bail!("invalid image mapping (expected lang=image): {pair}");
        };
        let language = Language::parse(name.trim())
            .ok_or_else(|| anyhow::anyhow!("unknown language in image mapping: {name}"))?;
        let image = image.trim();
        if image.is_empty() {
            anyhow::bail!("empty image for language {language}");
        }
        images.insert(language, image.to_string());
    }
    Ok(images)
}
