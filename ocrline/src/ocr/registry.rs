use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::EngineKind;

use super::engine::OcrEngine;

/// Cache key: engine plus the ordered language list it was loaded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub engine: EngineKind,
    pub languages: Vec<String>,
}

impl EngineKey {
    pub fn new(engine: EngineKind, languages: &[String]) -> Self {
        Self {
            engine,
            languages: languages.to_vec(),
        }
    }
}

type Slot = Arc<OnceCell<Arc<OcrEngine>>>;

/// Lazily initialized, shared engine instances.
///
/// Each key is initialized at most once even when many requests ask for it at
/// the same time: the first caller loads the engine and the others wait on the
/// same cell. A failed load leaves the cell empty so the next call retries.
#[derive(Default)]
pub struct EngineRegistry {
    slots: Mutex<HashMap<EngineKey, Slot>>,
}

static SHARED: OnceLock<Arc<EngineRegistry>> = OnceLock::new();

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by pipelines that are not given their own.
    pub fn shared() -> Arc<EngineRegistry> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(EngineRegistry::new())))
    }

    pub async fn get_or_init(
        &self,
        engine: EngineKind,
        languages: &[String],
        config: &EngineConfig,
    ) -> Result<Arc<OcrEngine>> {
        let key = EngineKey::new(engine, languages);
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };

        if let Some(ready) = slot.get() {
            return Ok(Arc::clone(ready));
        }

        let ready = slot
            .get_or_try_init(|| async {
                info!(engine = %engine, languages = ?languages, "Initializing OCR engine");
                OcrEngine::initialize(engine, languages, config)
                    .await
                    .map(Arc::new)
            })
            .await?;
        debug!(engine = %engine, "OCR engine ready");

        Ok(Arc::clone(ready))
    }

    pub async fn is_cached(&self, engine: EngineKind, languages: &[String]) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(&EngineKey::new(engine, languages))
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of initialized engines.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every cached engine. In-flight requests keep their own `Arc`.
    pub async fn shutdown(&self) {
        let mut slots = self.slots.lock().await;
        let count = slots.values().filter(|slot| slot.initialized()).count();
        slots.clear();
        info!(released = count, "OCR engine registry shut down");
    }
}
