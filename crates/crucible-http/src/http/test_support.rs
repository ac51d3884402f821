use std::net::SocketAddr;
use std::sync::Arc;

use tempfile::TempDir;
use url::Url;

use crucible_config::{ApiKey, Config, SandboxConfig};
use crucible_core::limits::LimitsPolicy;
use crucible_engine::orchestrator::Orchestrator;
use crucible_engine::rate_limiter::{RateLimiter, RateSpec};
use crucible_engine::sandbox::{MockOutcome, MockRunner, SandboxRunner};
use crucible_engine::stream_hub::StreamHub;
use crucible_storage::artifact_store::ArtifactStore;
use crucible_storage::run_store::RunStore;
use crucible_storage::signed_url::UrlSigner;

use super::AppState;

pub(super) const TOKEN: &str = "testtoken";
pub(super) const SIGNING_KEY: &[u8] = b"test-signing-key";

pub(super) struct TestServer {
    pub(super) addr: SocketAddr,
    pub(super) store: Arc<ArtifactStore>,
    pub(super) runner: Arc<SandboxRunner>,
    _work: TempDir,
    _storage: TempDir,
}

impl TestServer {
    pub(super) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub(super) fn mock(&self) -> &MockRunner {
        match self.runner.as_ref() {
            SandboxRunner::Mock(mock) => mock,
            SandboxRunner::Container(_) => unreachable!("tests install the mock"),
        }
    }
}

/// Bind a real listener, build the full router against the mock sandbox,
/// and serve it in the background for the duration of the test.
pub(super) async fn spawn_server(outcomes: Vec<MockOutcome>) -> TestServer {
    let work = TempDir::new().expect("work root");
    let storage = TempDir::new().expect("storage root");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let public_base_url = Url::parse(&format!("http://{addr}")).expect("base url");

    let config = Arc::new(Config {
        bind: addr,
        work_root: work.path().to_path_buf(),
        storage_root: storage.path().to_path_buf(),
        public_base_url: public_base_url.clone(),
        signing_key: SIGNING_KEY.to_vec(),
        signed_url_ttl_seconds: 600,
        api_keys: vec![ApiKey {
            token: TOKEN.to_string(),
            label: "alice".to_string(),
            rps: Some(5.0),
            burst: Some(5.0),
        }],
        default_rps: 5.0,
        default_burst: 5.0,
        limits: LimitsPolicy::default(),
        sandbox: SandboxConfig::default(),
    });

    let signer = UrlSigner::new(config.signing_key.clone(), public_base_url);
    let store = Arc::new(
        ArtifactStore::open(storage.path(), signer, config.signed_url_ttl_seconds)
            .expect("open store"),
    );
    let runs = Arc::new(RunStore::new());
    let hub = Arc::new(StreamHub::new());
    let limiter = Arc::new(RateLimiter::new(RateSpec {
        rps: config.default_rps,
        burst: config.default_burst,
    }));
    let runner = Arc::new(SandboxRunner::Mock(MockRunner::with_outcomes(outcomes)));
    let orchestrator = Arc::new(Orchestrator::new(
        work.path(),
        config.limits,
        store.clone(),
        runs.clone(),
        runner.clone(),
        hub.clone(),
    ));

    let app = super::router(AppState {
        config,
        orchestrator,
        store: store.clone(),
        runs,
        limiter,
        hub,
    });

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        addr,
        store,
        runner,
        _work: work,
        _storage: storage,
    }
}
