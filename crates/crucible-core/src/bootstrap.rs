use std::collections::HashMap;

use serde::Serialize;

use crate::limits::RunLimits;

/// The single JSON object delivered on the sandbox child's stdin. The
/// bootstrap reads it before any user code runs: it changes directory to
/// `/work`, clears the inherited environment, applies `env` plus a fixed
/// `PATH`, creates `tmp/` and `outputs/`, then executes the entry file with
/// `args`, enforcing `limits` and writing `usage.json` on the way out.
#[derive(Debug, Serialize)]
pub struct BootstrapSpec<'a> {
    pub id: &'a str,
    pub args: &'a [String],
    pub env: &'a HashMap<String, String>,
    pub limits: &'a RunLimits,
}
