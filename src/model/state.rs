//! Shared model readiness state.
//!
//! Holds at most one [`ModelBundle`]. The bundle is published once, completely,
//! by a single load task; concurrent callers wait on the in-flight load. The
//! task is owned by the state, not by the caller that started it, so a caller
//! that goes away does not abandon the load.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, Instrument};

use crate::error::{AppError, Result};
use crate::model::loader::ModelLoader;
use crate::model::types::{Device, LoadError, ModelBundle};
use crate::server::metrics;

type LoadOutcome = Option<std::result::Result<Arc<ModelBundle>, LoadError>>;

pub struct ModelState {
    inner: Arc<Inner>,
}

struct Inner {
    bundle: OnceCell<Arc<ModelBundle>>,
    loader: Arc<dyn ModelLoader>,
    /// Receiver for the running load, if any
    in_flight: Mutex<Option<watch::Receiver<LoadOutcome>>>,
    load_attempts: AtomicU64,
    load_failures: AtomicU64,
}

impl ModelState {
    /// Empty state; nothing is loaded until [`ModelState::ensure_loaded`].
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bundle: OnceCell::new(),
                loader,
                in_flight: Mutex::new(None),
                load_attempts: AtomicU64::new(0),
                load_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Return the loaded bundle, loading it first if needed.
    ///
    /// A failed load publishes nothing, so the next call tries again.
    pub async fn ensure_loaded(&self) -> Result<Arc<ModelBundle>> {
        if let Some(bundle) = self.inner.bundle.get() {
            return Ok(Arc::clone(bundle));
        }

        let mut rx = self.join_or_start_load();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::ModelUnavailable(LoadError::Task("load task ended".into())))?;

        match &*outcome {
            Some(Ok(bundle)) => Ok(Arc::clone(bundle)),
            Some(Err(e)) => Err(AppError::ModelUnavailable(e.clone())),
            None => Err(AppError::ModelUnavailable(LoadError::Task("no load outcome".into()))),
        }
    }

    fn join_or_start_load(&self) -> watch::Receiver<LoadOutcome> {
        let mut in_flight = self.inner.in_flight.lock();

        // The task publishes the bundle before clearing `in_flight`.
        if let Some(bundle) = self.inner.bundle.get() {
            return watch::channel(Some(Ok(Arc::clone(bundle)))).1;
        }
        if let Some(rx) = in_flight.as_ref() {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *in_flight = Some(rx.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            async move {
                let outcome = inner.load().await;
                if let Ok(bundle) = &outcome {
                    let _ = inner.bundle.set(Arc::clone(bundle));
                }
                inner.in_flight.lock().take();
                tx.send_replace(Some(outcome));
            }
            .in_current_span(),
        );
        rx
    }

    /// Whether a bundle is published. Never triggers a load.
    pub fn is_ready(&self) -> bool {
        self.inner.bundle.get().is_some()
    }

    pub fn device(&self) -> Option<Device> {
        self.inner.bundle.get().map(|bundle| bundle.device)
    }

    pub fn bundle(&self) -> Option<Arc<ModelBundle>> {
        self.inner.bundle.get().cloned()
    }

    /// Loads started so far, successful or not.
    pub fn load_attempts(&self) -> u64 {
        self.inner.load_attempts.load(Ordering::SeqCst)
    }

    pub fn load_failures(&self) -> u64 {
        self.inner.load_failures.load(Ordering::SeqCst)
    }
}

impl Inner {
    async fn load(&self) -> std::result::Result<Arc<ModelBundle>, LoadError> {
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let device = self.loader.device();
        info!(model = self.loader.target(), %device, attempt, "Model not loaded, loading now");

        let started = Instant::now();
        match self.loader.load().await {
            Ok(bundle) => {
                let elapsed = started.elapsed();
                metrics::record_model_load(elapsed, true);
                metrics::set_model_loaded(true);
                info!(
                    model = self.loader.target(),
                    device = %bundle.device,
                    strategy = %bundle.strategy,
                    backend = bundle.model.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Model ready"
                );
                Ok(Arc::new(bundle))
            }
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::SeqCst);
                metrics::record_model_load(started.elapsed(), false);
                error!(
                    model = self.loader.target(),
                    %device,
                    attempt,
                    error = %e,
                    error_type = e.kind(),
                    "Failed to load model"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::FakeLoader;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_empty_and_loads_on_demand() {
        let loader = Arc::new(FakeLoader::succeeding());
        let state = ModelState::new(loader.clone());

        assert!(!state.is_ready());
        assert_eq!(state.device(), None);
        assert_eq!(loader.calls(), 0);

        let bundle = state.ensure_loaded().await.unwrap();
        assert_eq!(bundle.device, Device::Cpu);
        assert!(state.is_ready());
        assert_eq!(state.device(), Some(Device::Cpu));

        state.ensure_loaded().await.unwrap();
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_load_once() {
        let loader = Arc::new(FakeLoader::succeeding().with_delay(Duration::from_millis(50)));
        let state = Arc::new(ModelState::new(loader.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                tokio::spawn(async move { state.ensure_loaded().await.map(|_| ()) })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(loader.calls(), 1);
        assert_eq!(state.load_attempts(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried_by_next_caller() {
        let loader = Arc::new(FakeLoader::failing(1));
        let state = ModelState::new(loader.clone());

        let err = state.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
        assert!(!state.is_ready());
        assert!(state.bundle().is_none());

        state.ensure_loaded().await.unwrap();
        assert!(state.is_ready());
        assert_eq!(state.load_attempts(), 2);
        assert_eq!(state.load_failures(), 1);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_restart_the_load() {
        let loader = Arc::new(FakeLoader::succeeding().with_delay(Duration::from_millis(200)));
        let state = ModelState::new(loader.clone());

        let first = tokio::time::timeout(Duration::from_millis(20), state.ensure_loaded()).await;
        assert!(first.is_err());
        assert!(!state.is_ready());

        state.ensure_loaded().await.unwrap();
        assert!(state.is_ready());
        assert_eq!(loader.calls(), 1);
        assert_eq!(state.load_attempts(), 1);
    }

    #[tokio::test]
    async fn load_finishes_without_any_waiter() {
        let loader = Arc::new(FakeLoader::succeeding().with_delay(Duration::from_millis(30)));
        let state = ModelState::new(loader.clone());

        let _ = tokio::time::timeout(Duration::from_millis(5), state.ensure_loaded()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(state.is_ready());
        assert_eq!(state.device(), Some(Device::Cpu));
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn readiness_check_never_loads() {
        let loader = Arc::new(FakeLoader::always_failing());
        let state = ModelState::new(loader.clone());
        for _ in 0..3 {
            assert!(!state.is_ready());
        }
        assert_eq!(loader.calls(), 0);
    }
}
