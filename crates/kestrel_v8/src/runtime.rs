//! Process-wide engine lifecycle.
//!
//! V8 platform and heap bring-up happen exactly once per process. The
//! legality of the transitions lives in [`Lifecycle`], a plain state table
//! that can be tested without touching the engine; the free functions below
//! apply the engine effects while holding the table's lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// States of the process-wide runtime guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initialized,
}

/// Transition table for the runtime guard. Pure state, no engine calls.
#[derive(Debug)]
pub struct Lifecycle {
    state: RuntimeState,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: RuntimeState::Uninitialized,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Uninitialized to Initialized. Returns false, without transitioning,
    /// when the guard is already initialized.
    pub fn begin_initialize(&mut self) -> bool {
        if self.state == RuntimeState::Initialized {
            return false;
        }
        self.state = RuntimeState::Initialized;
        true
    }

    /// Initialized to Uninitialized. Returns false, without transitioning,
    /// when there is nothing to dispose.
    pub fn begin_dispose(&mut self) -> bool {
        if self.state == RuntimeState::Uninitialized {
            return false;
        }
        self.state = RuntimeState::Uninitialized;
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

static LIFECYCLE: Mutex<Lifecycle> = Mutex::new(Lifecycle::new());

fn lifecycle() -> MutexGuard<'static, Lifecycle> {
    LIFECYCLE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Passes a flag string through to the engine.
///
/// Flags are only read at [`initialize`] time; sequencing is the caller's
/// responsibility.
pub fn set_flags(flags: &str) {
    if state() == RuntimeState::Initialized {
        log::warn!("engine flags set after initialization have no effect: {flags}");
    }
    v8::V8::set_flags_from_string(flags);
}

/// One-time platform and engine bring-up.
///
/// Returns false when the runtime is already initialized. The engine work
/// happens while the lifecycle lock is held, so racing initializers cannot
/// observe a half-built platform.
pub fn initialize() -> bool {
    let mut guard = lifecycle();
    if !guard.begin_initialize() {
        return false;
    }
    // https://github.com/denoland/rusty_v8/issues/1381
    let platform = v8::new_unprotected_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform);
    v8::V8::initialize();
    log::debug!("v8 {} initialized", version());
    true
}

/// Engine teardown. Returns false when the runtime was never initialized.
///
/// All isolates must have been dropped first, and V8 cannot be brought up
/// again in the same process afterward.
pub fn dispose() -> bool {
    let mut guard = lifecycle();
    if !guard.begin_dispose() {
        return false;
    }
    // SAFETY: the table guarantees a matching initialize, and the caller
    // guarantees no isolate outlives this point.
    unsafe {
        v8::V8::dispose();
        v8::V8::dispose_platform();
    }
    true
}

/// Engine version string. Pure, available before initialization.
pub fn version() -> &'static str {
    v8::VERSION_STRING
}

/// Current guard state.
pub fn state() -> RuntimeState {
    lifecycle().state()
}

/// Brings the runtime up if nobody has yet. Lets an [`crate::Evaluator`]
/// be created without explicit sequencing, the way engine wrappers usually
/// self-initialize.
pub(crate) fn ensure_initialized() {
    let _ = initialize();
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("i" => vec![true] ; "first initialize")]
    #[test_case("ii" => vec![true, false] ; "double initialize")]
    #[test_case("id" => vec![true, true] ; "initialize then dispose")]
    #[test_case("d" => vec![false] ; "dispose without initialize")]
    #[test_case("idd" => vec![true, true, false] ; "double dispose")]
    #[test_case("idi" => vec![true, true, true] ; "initialize after dispose")]
    fn lifecycle_table(ops: &str) -> Vec<bool> {
        let mut lifecycle = Lifecycle::new();
        ops.chars()
            .map(|op| match op {
                'i' => lifecycle.begin_initialize(),
                _ => lifecycle.begin_dispose(),
            })
            .collect()
    }

    #[test]
    fn fresh_guard_is_uninitialized() {
        assert_eq!(Lifecycle::new().state(), RuntimeState::Uninitialized);
    }

    #[test]
    fn initialize_is_once_per_process() {
        initialize();
        assert_eq!(state(), RuntimeState::Initialized);
        assert!(!initialize());
    }

    #[test]
    fn version_looks_like_a_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.split('.').count() >= 3);
    }
}
