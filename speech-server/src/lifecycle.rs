//! Single-load lifecycle for the process-wide speech engine.

use std::sync::Arc;
use synth::Synthesizer;
use tokio::sync::RwLock;
use tracing::warn;

/// Where the engine is in its life: `Loading → Ready | Failed`, with
/// `Released` as the terminal shutdown state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Loading,
    Ready,
    Failed(String),
    Released,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Loading => "loading",
            EngineStatus::Ready => "ready",
            EngineStatus::Failed(_) => "failed",
            EngineStatus::Released => "released",
        }
    }
}

struct Slot {
    status: EngineStatus,
    engine: Option<Arc<dyn Synthesizer>>,
}

/// Owns the one expensive engine handle.
///
/// Handlers only ever observe a fully constructed engine: the slot is
/// published under a write lock after [`connect`] has already succeeded.
/// A failed load parks the service in `Failed`; there is no retry, the
/// process stays reachable so health checks can report the degraded state.
///
/// [`connect`]: synth::KokoroPipeline::connect
pub struct EngineManager {
    slot: RwLock<Slot>,
}

impl EngineManager {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot {
                status: EngineStatus::Loading,
                engine: None,
            }),
        }
    }

    /// Publish a loaded engine. Ignored after [`release`](Self::release).
    pub async fn install(&self, engine: Arc<dyn Synthesizer>) {
        let mut slot = self.slot.write().await;
        if slot.status == EngineStatus::Released {
            warn!("engine finished loading after shutdown, discarding");
            return;
        }
        slot.engine = Some(engine);
        slot.status = EngineStatus::Ready;
    }

    /// Record a load failure; the service stays up but unready.
    pub async fn fail(&self, message: impl Into<String>) {
        let mut slot = self.slot.write().await;
        if slot.status == EngineStatus::Released {
            return;
        }
        slot.status = EngineStatus::Failed(message.into());
    }

    /// Drop the engine reference on shutdown.
    pub async fn release(&self) {
        let mut slot = self.slot.write().await;
        slot.engine = None;
        slot.status = EngineStatus::Released;
    }

    /// The engine, if and only if it is ready to serve.
    pub async fn engine(&self) -> Option<Arc<dyn Synthesizer>> {
        let slot = self.slot.read().await;
        match slot.status {
            EngineStatus::Ready => slot.engine.clone(),
            _ => None,
        }
    }

    pub async fn status(&self) -> EngineStatus {
        self.slot.read().await.status.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.slot.read().await.status == EngineStatus::Ready
    }
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use synth::{SpeechRequest, SpeechStream, SynthError};

    struct NullEngine;

    #[async_trait]
    impl Synthesizer for NullEngine {
        async fn synthesize(&self, _req: &SpeechRequest) -> synth::Result<SpeechStream> {
            Err(SynthError::Empty)
        }

        fn engine_name(&self) -> &str {
            "null"
        }
    }

    #[tokio::test]
    async fn starts_loading_without_an_engine() {
        let manager = EngineManager::new();
        assert_eq!(manager.status().await, EngineStatus::Loading);
        assert!(!manager.is_ready().await);
        assert!(manager.engine().await.is_none());
    }

    #[tokio::test]
    async fn install_makes_engine_readable() {
        let manager = EngineManager::new();
        manager.install(Arc::new(NullEngine)).await;
        assert!(manager.is_ready().await);
        assert!(manager.engine().await.is_some());
    }

    #[tokio::test]
    async fn failed_load_stays_unready() {
        let manager = EngineManager::new();
        manager.fail("weights missing").await;
        assert_eq!(
            manager.status().await,
            EngineStatus::Failed("weights missing".into())
        );
        assert!(manager.engine().await.is_none());
    }

    #[tokio::test]
    async fn release_clears_engine() {
        let manager = EngineManager::new();
        manager.install(Arc::new(NullEngine)).await;
        manager.release().await;
        assert_eq!(manager.status().await, EngineStatus::Released);
        assert!(manager.engine().await.is_none());
    }

    #[tokio::test]
    async fn late_install_after_release_is_discarded() {
        let manager = EngineManager::new();
        manager.release().await;
        manager.install(Arc::new(NullEngine)).await;
        assert_eq!(manager.status().await, EngineStatus::Released);
        assert!(manager.engine().await.is_none());
    }
}
