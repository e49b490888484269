//! Speech synthesis engines.
//!
//! This module contains the implementations of [`AudioEngine`](crate::AudioEngine).
//!
//! # Available Engines
//!
//! - `mock` - silent placeholder audio, always available
//! - `piper` - Piper CLI (`piper` on PATH plus voice models)
//! - `dia2` - Dia2 two-speaker conversations (`dia2` on PATH or a uv project)
//! - `kokoro` - Kokoro TTS (ONNX format, espeak-ng required), behind the
//!   `kokoro` Cargo feature

pub mod dia2;
pub mod markers;
pub mod mock;
pub mod piper;
pub mod process;

#[cfg(feature = "kokoro")]
pub mod kokoro;

use std::env;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::{AudioEngine, EngineError};

/// Keeps an engine loaded for the lifetime of the guard.
///
/// Dropping the guard unloads the engine on every exit path, including early
/// returns and panics unwinding through the scope.
///
/// ```
/// use hearme::{AudioEngine, engines::{mock::MockEngine, ScopedLoad}};
///
/// let mut engine = MockEngine::new();
/// {
///     let scope = ScopedLoad::enter(&mut engine)?;
///     assert!(scope.is_loaded());
/// }
/// assert!(!engine.is_loaded());
/// # Ok::<(), hearme::EngineError>(())
/// ```
pub struct ScopedLoad<'a, E: AudioEngine + ?Sized> {
    engine: &'a mut E,
}

impl<'a, E: AudioEngine + ?Sized> ScopedLoad<'a, E> {
    /// Load `engine` and hand back the guard.
    ///
    /// A failed load still runs `unload()` before the error is returned.
    pub fn enter(engine: &'a mut E) -> Result<Self, EngineError> {
        let mut scope = Self { engine };
        scope.engine.load()?;
        log::info!("Engine {} loaded", scope.engine.name());
        Ok(scope)
    }
}

impl<E: AudioEngine + ?Sized> Deref for ScopedLoad<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: AudioEngine + ?Sized> DerefMut for ScopedLoad<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: AudioEngine + ?Sized> Drop for ScopedLoad<'_, E> {
    fn drop(&mut self) {
        let name = self.engine.name();
        if panic::catch_unwind(AssertUnwindSafe(|| self.engine.unload())).is_err() {
            log::error!("Engine {name} panicked while unloading");
            return;
        }
        log::info!("Engine {name} unloaded - memory freed");
    }
}

/// Locate an executable on PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| executable_in(&dir, name))
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(name);
    if is_executable(&candidate) {
        return Some(candidate);
    }
    if cfg!(windows) {
        let candidate = dir.join(format!("{name}.exe"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
