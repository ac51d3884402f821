use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Signed-URL check failed. Every sub-reason (bad signature, wrong path or
/// method, expiry) collapses into this one kind; clients cannot tell them
/// apart.
#[derive(Debug, Clone)]
pub struct Forbidden;

impl fmt::Display for Forbidden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("signed url verification failed")
    }
}

impl std::error::Error for Forbidden {}

/// The compact JSON object carried in the `payload` query parameter.
#[derive(Debug, Serialize, Deserialize)]
struct SignedPayload {
    path: String,
    exp: i64,
    method: String,
}

/// Mints and verifies HMAC-signed, time-limited download URLs. Stateless by
/// design: expiry and path travel inside the signed payload, so there is no
/// per-URL server state to coordinate.
#[derive(Debug, Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    base_url: Url,
}

impl UrlSigner {
    pub fn new(key: Vec<u8>, base_url: Url) -> Self {
        Self { key, base_url }
    }

    /// Produce an absolute URL authorizing one GET of `path` until
    /// `expires_at` (unix seconds).
    pub fn sign(&self, path: &str, expires_at: i64) -> Result<String, anyhow::Error> {
        let payload = serde_json::to_vec(&SignedPayload {
            path: path.to_string(),
            exp: expires_at,
            method: "GET".to_string(),
        })?;
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| anyhow::anyhow!("unusable hmac key"))?;
        mac.update(&payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);

        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut()
            .append_pair("payload", &payload_b64)
            .append_pair("sig", &sig);
        Ok(url.into())
    }

    /// Verify a download request. The MAC comparison runs first and in
    /// constant time; only then are path, method, and expiry checked.
    pub fn verify(
        &self,
        request_path: &str,
        payload_b64: &str,
        sig_hex: &str,
        now: i64,
    ) -> Result<(), Forbidden> {
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| {
            tracing::debug!("signed url rejected: payload not base64url");
            Forbidden
        })?;
        let sig = hex::decode(sig_hex).map_err(|_| {
            tracing::debug!("signed url rejected: signature not hex");
            Forbidden
        })?;

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| Forbidden)?;
        mac.update(&payload_bytes);
        mac.verify_slice(&sig).map_err(|_| {
            tracing::debug!("signed url rejected: bad signature");
            Forbidden
        })?;

        let payload: SignedPayload = serde_json::from_slice(&payload_bytes).map_err(|_| {
            tracing::debug!("signed url rejected: payload not valid json");
            Forbidden
        })?;
        if payload.path != request_path {
            tracing::debug!(path = %request_path, "signed url rejected: path mismatch");
            return Err(Forbidden);
        }
        if payload.method != "GET" {
            tracing::debug!(method = %payload.method, "signed url rejected: method mismatch");
            return Err(Forbidden);
        }
        if payload.exp < now {
            tracing::debug!(exp = payload.exp, now, "signed url rejected: expired");
            return Err(Forbidden);
        }
        Ok(())
    }
}
