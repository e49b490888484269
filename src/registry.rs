//! Engine registry: named factories, one shared instance per name, and a
//! priority-ordered fallback list.
//!
//! Lower priority numbers are preferred. The default table is:
//!
//! | engine   | priority |
//! |----------|----------|
//! | `dia2`   | 10       |
//! | `kokoro` | 30       |
//! | `piper`  | 50       |
//! | `mock`   | 100      |
//!
//! The registry is an ordinary value. Build one at startup with
//! [`EngineRegistry::with_default_engines`] and pass it by reference to the
//! renderer and the diagnostics functions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::config::HearmeConfig;
use crate::engines::dia2::Dia2Engine;
use crate::engines::mock::MockEngine;
use crate::engines::piper::PiperEngine;
use crate::{AudioEngine, EngineCapabilities, EngineError};

/// Constructor for one engine instance.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync>;

/// The registry's shared instance of an engine.
pub type SharedEngine = Arc<EngineHandle>;

/// A constructed engine behind a lock.
///
/// The lock serializes load, synthesis and unload on one instance. Static facts
/// (name, capabilities, availability) are captured when the handle is built and
/// never wait for it.
pub struct EngineHandle {
    name: String,
    capabilities: EngineCapabilities,
    available: bool,
    engine: Mutex<Box<dyn AudioEngine>>,
}

impl EngineHandle {
    fn new(name: String, engine: Box<dyn AudioEngine>) -> Self {
        let available = engine.is_available();
        log::debug!("Engine {name} available: {available}");
        Self {
            name,
            capabilities: engine.capabilities(),
            available,
            engine: Mutex::new(engine),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    /// The engine's availability, probed once when the instance was built.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Exclusive access to the engine, waiting for any other user.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn AudioEngine>> {
        self.engine.lock()
    }

    /// Exclusive access if nobody else holds the engine right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Box<dyn AudioEngine>>> {
        self.engine.try_lock()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("name", &self.name)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

struct Registration {
    priority: i32,
    seq: usize,
    factory: EngineFactory,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, Registration>,
    /// Names sorted by (priority, registration order).
    order: Vec<String>,
    next_seq: usize,
}

impl Table {
    fn sort(&mut self) {
        let entries = &self.entries;
        self.order
            .sort_by_key(|name| entries.get(name).map(|r| (r.priority, r.seq)));
    }
}

#[derive(Default)]
pub struct EngineRegistry {
    table: RwLock<Table>,
    instances: Mutex<HashMap<String, SharedEngine>>,
}

/// Box an engine for use as a factory result.
pub fn boxed<E: AudioEngine + 'static>(engine: E) -> Result<Box<dyn AudioEngine>, EngineError> {
    Ok(Box::new(engine))
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every engine compiled into this build.
    ///
    /// `mock`, `dia2` and `piper` are always registered; `kokoro` only with the
    /// `kokoro` feature. Registering does not probe anything. Each engine probes
    /// its runtime once, when its instance is first built.
    pub fn with_default_engines(config: &HearmeConfig) -> Self {
        let registry = Self::new();
        let models_dir = config.models_dir();
        let timeout = config.synthesis_timeout();

        let dia2_dir = models_dir.join("dia2");
        registry.register("dia2", 10, move || boxed(Dia2Engine::new(dia2_dir.clone(), timeout)));

        #[cfg(feature = "kokoro")]
        {
            let kokoro_dir = models_dir.join("kokoro");
            registry.register("kokoro", 30, move || {
                boxed(crate::engines::kokoro::KokoroEngine::new(kokoro_dir.clone()))
            });
        }
        #[cfg(not(feature = "kokoro"))]
        log::debug!("Kokoro engine not compiled in (enable the `kokoro` feature)");

        let piper_dir = models_dir.join("piper");
        registry.register("piper", 50, move || boxed(PiperEngine::new(piper_dir.clone(), timeout)));

        registry.register("mock", 100, || boxed(MockEngine::new()));
        registry
    }

    /// Register `factory` under `name` (case-insensitive).
    ///
    /// Registering an existing name replaces its factory and priority but keeps
    /// its place among equal priorities. An instance already built for that name
    /// stays cached.
    pub fn register<F>(&self, name: &str, priority: i32, factory: F)
    where
        F: Fn() -> Result<Box<dyn AudioEngine>, EngineError> + Send + Sync + 'static,
    {
        let name = name.to_lowercase();
        let mut table = self.table.write();

        let seq = match table.entries.get(&name) {
            Some(existing) => existing.seq,
            None => {
                let seq = table.next_seq;
                table.next_seq += 1;
                table.order.push(name.clone());
                seq
            }
        };
        table.entries.insert(
            name.clone(),
            Registration {
                priority,
                seq,
                factory: Arc::new(factory),
            },
        );
        table.sort();
        log::debug!("Registered engine {name} (priority {priority})");
    }

    /// Registered names in fallback order.
    pub fn registered(&self) -> Vec<String> {
        self.table.read().order.clone()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.read().entries.contains_key(&name.to_lowercase())
    }

    /// The shared instance for `name`, constructing it on first use.
    ///
    /// Unknown names and failing constructors both yield `None`.
    pub fn get(&self, name: &str) -> Option<SharedEngine> {
        let name = name.to_lowercase();
        let mut instances = self.instances.lock();
        if let Some(handle) = instances.get(&name) {
            return Some(Arc::clone(handle));
        }

        let factory = {
            let table = self.table.read();
            Arc::clone(&table.entries.get(&name)?.factory)
        };

        // The instance map stays locked so two callers never build the same engine.
        match factory() {
            Ok(engine) => {
                let handle = Arc::new(EngineHandle::new(name.clone(), engine));
                instances.insert(name, Arc::clone(&handle));
                Some(handle)
            }
            Err(e) => {
                log::warn!("Failed to create engine {name}: {e}");
                None
            }
        }
    }

    /// Names of registered engines that can run here, in fallback order.
    pub fn get_available(&self) -> Vec<String> {
        self.registered()
            .into_iter()
            .filter(|name| self.get(name).is_some_and(|handle| handle.is_available()))
            .collect()
    }

    /// The first available engine in fallback order.
    pub fn get_best_available(&self) -> Option<SharedEngine> {
        let best = self
            .registered()
            .iter()
            .filter_map(|name| self.get(name))
            .find(|handle| handle.is_available());
        match &best {
            Some(handle) => log::info!("Selected engine: {}", handle.name()),
            None => log::warn!("No audio engine available"),
        }
        best
    }

    /// Capabilities of every registered engine that can be constructed.
    pub fn list_all(&self) -> Vec<EngineCapabilities> {
        self.registered()
            .iter()
            .filter_map(|name| self.get(name))
            .map(|handle| handle.capabilities().clone())
            .collect()
    }

    /// Engines constructed so far, in fallback order.
    pub fn instances(&self) -> Vec<SharedEngine> {
        let instances = self.instances.lock();
        self.registered()
            .iter()
            .filter_map(|name| instances.get(name).cloned())
            .collect()
    }

    /// Forget every registration and instance. Meant for tests.
    pub fn clear(&self) {
        let mut instances = self.instances.lock();
        *self.table.write() = Table::default();
        instances.clear();
    }
}

/// `name` if given, otherwise the best available engine.
pub fn get_engine(registry: &EngineRegistry, name: Option<&str>) -> Option<SharedEngine> {
    match name {
        Some(name) => registry.get(name),
        None => registry.get_best_available(),
    }
}
