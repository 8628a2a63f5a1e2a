//! Lifecycle of the single shared browser engine.
//!
//! This module provides the [`LifecycleManager`], which owns at most one live
//! engine, launches it once even when many requests race for it, and tears it
//! down on shutdown.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Engine, EngineLauncher};
use crate::{RenderError, Result};

type LaunchOutcome<E> = std::result::Result<Arc<E>, Arc<str>>;
type SharedLaunch<E> = Shared<BoxFuture<'static, LaunchOutcome<E>>>;

/// Externally visible state of the shared engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Absent,
    Starting,
    Ready,
    Stopped,
}

enum EngineState<E> {
    Absent,
    Starting {
        generation: u64,
        launch: SharedLaunch<E>,
    },
    Ready(Arc<E>),
    Stopped,
}

/// Owns the shared engine handle.
///
/// Cloning the manager is not supported; share it behind an `Arc`.
pub struct LifecycleManager<L: EngineLauncher> {
    launcher: Arc<L>,
    state: Mutex<EngineState<L::Engine>>,
    generation: AtomicU64,
    launches: AtomicUsize,
}

impl<L: EngineLauncher> LifecycleManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            state: Mutex::new(EngineState::Absent),
            generation: AtomicU64::new(0),
            launches: AtomicUsize::new(0),
        }
    }

    /// Current engine state. Never touches the engine itself.
    pub fn status(&self) -> EngineStatus {
        match &*self.lock_state() {
            EngineState::Absent => EngineStatus::Absent,
            EngineState::Starting { .. } => EngineStatus::Starting,
            EngineState::Ready(_) => EngineStatus::Ready,
            EngineState::Stopped => EngineStatus::Stopped,
        }
    }

    /// Number of launches attempted so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Return the shared engine, launching it if nobody has yet.
    ///
    /// Callers arriving while a launch is in flight wait for that same launch.
    /// If it fails, every waiter receives [`RenderError::EngineLaunch`] and the
    /// state falls back to absent so a later call can try again.
    pub async fn ensure_ready(&self) -> Result<Arc<L::Engine>> {
        let (generation, launch) = {
            let mut state = self.lock_state();
            match &*state {
                EngineState::Ready(engine) => return Ok(Arc::clone(engine)),
                EngineState::Stopped => {
                    return Err(RenderError::ServiceUnavailable(
                        "browser engine has been shut down".to_string(),
                    ))
                }
                EngineState::Starting { generation, launch } => (*generation, launch.clone()),
                EngineState::Absent => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let launch = self.start_launch();
                    *state = EngineState::Starting {
                        generation,
                        launch: launch.clone(),
                    };
                    (generation, launch)
                }
            }
        };

        let outcome = launch.await;

        let mut state = self.lock_state();
        let current = matches!(
            &*state,
            EngineState::Starting { generation: g, .. } if *g == generation
        );
        match outcome {
            Ok(engine) => {
                if current {
                    *state = EngineState::Ready(Arc::clone(&engine));
                }
                Ok(engine)
            }
            Err(message) => {
                if current {
                    *state = EngineState::Absent;
                }
                Err(RenderError::EngineLaunch(message.to_string()))
            }
        }
    }

    fn start_launch(&self) -> SharedLaunch<L::Engine> {
        let launcher = Arc::clone(&self.launcher);
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let start = Instant::now();
            info!(attempt, "launching browser engine");
            match launcher.launch().await {
                Ok(engine) => {
                    info!(
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "browser engine ready"
                    );
                    Ok(Arc::new(engine))
                }
                Err(e) => {
                    warn!(attempt, error = %e, "browser engine launch failed");
                    Err(Arc::<str>::from(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Terminate the engine if one is live. Safe to call repeatedly; once
    /// called, no new engine will be launched.
    pub async fn shutdown(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lock_state(), EngineState::Stopped);
        let engine = match previous {
            EngineState::Ready(engine) => engine,
            EngineState::Starting { launch, .. } => match launch.await {
                Ok(engine) => engine,
                Err(_) => return Ok(()),
            },
            EngineState::Absent | EngineState::Stopped => {
                debug!("shutdown requested with no live browser engine");
                return Ok(());
            }
        };

        info!("shutting down browser engine");
        engine.shutdown().await
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState<L::Engine>> {
        // The state machine is always left consistent between statements, so
        // a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ScriptedLauncher;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_absent_and_becomes_ready() {
        let manager = LifecycleManager::new(ScriptedLauncher::default());
        assert_eq!(manager.status(), EngineStatus::Absent);

        let first = manager.ensure_ready().await.unwrap();
        let second = manager.ensure_ready().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.status(), EngineStatus::Ready);
        assert_eq!(manager.launch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_launch() {
        let launcher = ScriptedLauncher::default().with_launch_delay(Duration::from_millis(50));
        let stats = launcher.stats();
        let manager = Arc::new(LifecycleManager::new(launcher));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_ready().await })
            })
            .collect();

        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap().unwrap());
        }
        assert!(engines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(stats.launches(), 1);
        assert_eq!(manager.launch_count(), 1);
    }

    #[tokio::test]
    async fn failed_launch_can_be_retried() {
        let launcher = ScriptedLauncher::default().with_failed_launches(1);
        let stats = launcher.stats();
        let manager = LifecycleManager::new(launcher);

        let err = manager.ensure_ready().await.unwrap_err();
        assert!(matches!(err, RenderError::EngineLaunch(_)));
        assert_eq!(manager.status(), EngineStatus::Absent);

        manager.ensure_ready().await.unwrap();
        assert_eq!(manager.status(), EngineStatus::Ready);
        assert_eq!(stats.launches(), 2);
    }

    #[tokio::test]
    async fn waiters_on_failed_launch_all_see_the_error() {
        let launcher = ScriptedLauncher::default()
            .with_launch_delay(Duration::from_millis(30))
            .with_failed_launches(1);
        let stats = launcher.stats();
        let manager = Arc::new(LifecycleManager::new(launcher));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_ready().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(stats.launches(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let launcher = ScriptedLauncher::default();
        let stats = launcher.stats();
        let manager = LifecycleManager::new(launcher);

        manager.ensure_ready().await.unwrap();
        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();

        assert_eq!(stats.shutdowns(), 1);
        assert_eq!(manager.status(), EngineStatus::Stopped);
    }

    #[tokio::test]
    async fn shutdown_without_engine_is_a_no_op() {
        let launcher = ScriptedLauncher::default();
        let stats = launcher.stats();
        let manager = LifecycleManager::new(launcher);

        manager.shutdown().await.unwrap();
        assert_eq!(stats.launches(), 0);
        assert_eq!(stats.shutdowns(), 0);
    }

    #[tokio::test]
    async fn ensure_ready_after_shutdown_is_unavailable() {
        let manager = LifecycleManager::new(ScriptedLauncher::default());
        manager.shutdown().await.unwrap();

        let err = manager.ensure_ready().await.unwrap_err();
        assert!(matches!(err, RenderError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn shutdown_during_launch_terminates_the_new_engine() {
        let launcher = ScriptedLauncher::default().with_launch_delay(Duration::from_millis(50));
        let stats = launcher.stats();
        let manager = Arc::new(LifecycleManager::new(launcher));

        let pending = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.ensure_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status(), EngineStatus::Starting);

        manager.shutdown().await.unwrap();
        assert_eq!(stats.shutdowns(), 1);
        assert_eq!(manager.status(), EngineStatus::Stopped);
        // The in-flight caller still receives the engine it waited for.
        assert!(pending.await.unwrap().is_ok());
    }
}
