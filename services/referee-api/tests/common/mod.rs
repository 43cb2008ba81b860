#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{extract::State, routing::get, Router};
use referee_api::{
    bootstrap, router, AppState, CompatPatches, DetectionStack, EnvironmentProfile, ImportError, ModelAcquirer,
    NumericRuntime, ReadinessState, Scorer, ARRAY_API_PLACEHOLDER,
};
use tokio::net::TcpListener;

pub const NUMPY_IMPORT_ERROR: &str =
    "A module that was compiled using NumPy 1.x cannot be run in NumPy 2.0.2 as it may crash.";

#[derive(Debug)]
pub struct FakeScorer;

impl Scorer for FakeScorer {
    fn backend(&self) -> &str { "fake" }
    fn describe(&self) -> String { "fake scorer".into() }
}

/// Detection stack double: import and scorer construction are scripted.
#[derive(Debug, Default, Clone)]
pub struct FakeStack {
    pub import_error: Option<String>,
    pub needs_array_api: bool,
    pub fail_build: bool,
    pub numeric: Option<String>,
}

impl NumericRuntime for FakeStack {
    fn numeric_version(&self) -> anyhow::Result<String> {
        self.numeric.clone().ok_or_else(|| anyhow!("numeric runtime missing"))
    }
}

impl DetectionStack for FakeStack {
    fn name(&self) -> &str { "fake" }

    fn import(&self, patches: &CompatPatches) -> Result<(), ImportError> {
        if let Some(e) = &self.import_error {
            return Err(ImportError(e.clone()));
        }
        if self.needs_array_api && !patches.has(ARRAY_API_PLACEHOLDER) {
            return Err(ImportError(NUMPY_IMPORT_ERROR.into()));
        }
        Ok(())
    }

    fn build_scorer(&self, model_path: &Path) -> anyhow::Result<Arc<dyn Scorer>> {
        if self.fail_build {
            return Err(anyhow!("corrupt weights at {}", model_path.display()));
        }
        std::fs::metadata(model_path)?;
        Ok(Arc::new(FakeScorer))
    }
}

pub fn profile(model_path: PathBuf, is_hosted: bool, model_url: Option<String>) -> EnvironmentProfile {
    EnvironmentProfile { is_hosted, model_path, model_url, public_host: None }
}

pub async fn boot(profile: EnvironmentProfile, stack: FakeStack, patches: CompatPatches) -> ReadinessState {
    let acquirer = ModelAcquirer::new(Some(Duration::from_secs(10))).unwrap();
    bootstrap(profile, Arc::new(stack), &patches, &acquirer).await
}

/// Serves the full router on an ephemeral port, returns the base URL.
pub async fn spawn_app(readiness: ReadinessState) -> String {
    spawn_app_with_limit(readiness, 4 * 1024 * 1024).await
}

pub async fn spawn_app_with_limit(readiness: ReadinessState, max_upload_bytes: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(readiness), max_upload_bytes);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// Model file server that counts how often it is hit.
pub async fn spawn_model_server(body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/best.onnx", get(|State((hits, body)): State<(Arc<AtomicUsize>, Arc<Vec<u8>>)>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            body.as_ref().clone()
        }))
        .with_state((hits.clone(), Arc::new(body)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}/best.onnx"), hits)
}
