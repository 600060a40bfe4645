//! One isolate, one live context, one operation at a time.
//!
//! An [`Evaluator`] owns its isolate exclusively. Every public operation
//! takes the internal lock for its full duration, then builds the scope
//! stack (handle scope, materialized context, context scope, exception
//! trap) from scratch; no engine handle survives past the operation that
//! created it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use v8::{Global, HandleScope, IsolateHandle, Local, OwnedIsolate, PinnedRef, TryCatch};

use crate::errors::ScriptError;
use crate::marshal;
use crate::runtime;

/// Logical origin name attached to compiled scripts for diagnostics.
const ORIGIN_NAME: &str = "kestrel";

struct EvalState {
    // Declared before the isolate: a persistent handle must be released
    // while its isolate is still alive.
    context: Global<v8::Context>,
    isolate: OwnedIsolate,
}

/// A JavaScript evaluator: one isolate plus its current global context.
///
/// `eval` and `call` return the flat protocol string (JSON on success,
/// error text on failure); `try_eval` and `try_call` are the tagged
/// equivalents. Operations from multiple threads serialize on the
/// internal lock.
pub struct Evaluator {
    state: Mutex<EvalState>,
    interrupt: IsolateHandle,
}

impl Evaluator {
    /// Creates the isolate with a default array-buffer allocator and
    /// installs the initial context. Brings the process runtime up first
    /// if the caller has not done so.
    pub fn new() -> Self {
        runtime::ensure_initialized();
        let params =
            v8::CreateParams::default().array_buffer_allocator(v8::new_default_allocator().make_shared());
        let mut isolate = v8::Isolate::new(params);
        let interrupt = isolate.thread_safe_handle();
        let context = new_global_context(&mut isolate);
        Self {
            state: Mutex::new(EvalState { context, isolate }),
            interrupt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EvalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discards the current context and installs a fresh default one.
    ///
    /// Globals defined by earlier scripts are gone afterward; the isolate
    /// itself, and anything attached at isolate level, survives.
    pub fn reset_context(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.context = new_global_context(&mut state.isolate);
    }

    /// Runs `script` as a top-level program in the current context and
    /// returns the JSON rendition of its completion value.
    ///
    /// Compile failures surface as the exception text; run failures prefer
    /// the stack trace and fall back to the exception text. Global state
    /// created by the script persists until [`Self::reset_context`].
    pub fn try_eval(&self, script: &str) -> Result<String, ScriptError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        v8::scope!(let scope, &mut state.isolate);
        let context = Local::new(scope, &state.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        v8::tc_scope!(let tc, scope);

        let Some(source) = v8::String::new(tc, script) else {
            return Err(ScriptError::Compile("script source too large".to_owned()));
        };
        let Some(name) = v8::String::new(tc, ORIGIN_NAME) else {
            return Err(ScriptError::Compile("script origin unavailable".to_owned()));
        };
        let origin = v8::ScriptOrigin::new(
            tc,
            name.into(),
            0,
            0,
            false,
            0,
            None,
            false,
            false,
            false,
            None,
        );

        let Some(script) = v8::Script::compile(tc, source, Some(&origin)) else {
            return Err(ScriptError::Compile(exception_text(tc)));
        };

        match script.run(tc) {
            Some(value) => Ok(marshal::stringify(tc, value)),
            None => Err(self.run_failure(tc)),
        }
    }

    /// Flat protocol form of [`Self::try_eval`]: success JSON and error
    /// text share the return channel, as the embedding boundary expects.
    pub fn eval(&self, script: &str) -> String {
        self.try_eval(script).unwrap_or_else(|err| err.to_string())
    }

    /// Invokes the global function `name` with arguments decoded from
    /// `json_args`, which must be a JSON array.
    ///
    /// The receiver is the function object itself, not the global object;
    /// existing callers depend on that binding.
    pub fn try_call(&self, name: &str, json_args: &str) -> Result<String, ScriptError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        v8::scope!(let scope, &mut state.isolate);
        let context = Local::new(scope, &state.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        v8::tc_scope!(let tc, scope);

        let global = context.global(tc);
        let Some(key) = v8::String::new(tc, name) else {
            return Err(ScriptError::NotAFunction(name.to_owned()));
        };
        let Some(looked_up) = global.get(tc, key.into()) else {
            return Err(ScriptError::Exception(exception_text(tc)));
        };
        let Ok(function) = Local::<v8::Function>::try_from(looked_up) else {
            return Err(ScriptError::NotAFunction(name.to_owned()));
        };

        let Some(parsed) = marshal::parse(tc, json_args) else {
            return Err(ScriptError::NotAnArray(json_args.to_owned()));
        };
        let Ok(arguments) = Local::<v8::Array>::try_from(parsed) else {
            return Err(ScriptError::NotAnArray(json_args.to_owned()));
        };

        let mut argv: Vec<Local<v8::Value>> = Vec::with_capacity(arguments.length() as usize);
        for index in 0..arguments.length() {
            let element = arguments
                .get_index(tc, index)
                .unwrap_or_else(|| v8::undefined(tc).into());
            argv.push(element);
        }

        match function.call(tc, function.into(), &argv) {
            Some(value) => Ok(marshal::stringify(tc, value)),
            None => Err(self.call_failure(tc)),
        }
    }

    /// Flat protocol form of [`Self::try_call`].
    pub fn call(&self, name: &str, json_args: &str) -> String {
        self.try_call(name, json_args)
            .unwrap_or_else(|err| err.to_string())
    }

    /// Snapshot of the isolate's heap counters.
    pub fn heap_report(&self) -> HeapReport {
        let mut guard = self.lock();
        let stats = guard.isolate.get_heap_statistics();
        HeapReport {
            total_heap_size: stats.total_heap_size(),
            used_heap_size: stats.used_heap_size(),
            heap_size_limit: stats.heap_size_limit(),
            external_memory: stats.external_memory(),
        }
    }

    /// Thread-safe handle that can abort whatever this evaluator is
    /// executing. The aborted operation returns an error string and the
    /// evaluator stays usable.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            inner: self.interrupt.clone(),
        }
    }

    /// Run failure for `eval`: stack trace preferred, exception text as
    /// the fallback.
    fn run_failure(&self, tc: &PinnedRef<'_, TryCatch<'_, '_, HandleScope<'_>>>) -> ScriptError {
        if self.cancel_termination(tc) {
            return ScriptError::Exception("execution terminated".to_owned());
        }
        match tc.stack_trace() {
            Some(stack) => ScriptError::Exception(marshal::to_rust_string(tc, stack)),
            None => ScriptError::Exception(exception_text(tc)),
        }
    }

    /// Invocation failure for `call`: plain exception text.
    fn call_failure(&self, tc: &PinnedRef<'_, TryCatch<'_, '_, HandleScope<'_>>>) -> ScriptError {
        if self.cancel_termination(tc) {
            return ScriptError::Exception("execution terminated".to_owned());
        }
        ScriptError::Exception(exception_text(tc))
    }

    fn cancel_termination(&self, tc: &PinnedRef<'_, TryCatch<'_, '_, HandleScope<'_>>>) -> bool {
        if tc.has_terminated() {
            self.interrupt.cancel_terminate_execution();
            return true;
        }
        false
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests termination of a running script from another thread.
#[derive(Clone)]
pub struct InterruptHandle {
    inner: IsolateHandle,
}

impl InterruptHandle {
    /// Returns false when the isolate is already gone.
    pub fn terminate(&self) -> bool {
        self.inner.terminate_execution()
    }
}

/// Heap counters of one isolate, in bytes.
#[derive(Clone, Copy, Debug)]
pub struct HeapReport {
    pub total_heap_size: usize,
    pub used_heap_size: usize,
    pub heap_size_limit: usize,
    pub external_memory: usize,
}

impl HeapReport {
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "total_heap_size": self.total_heap_size,
            "used_heap_size": self.used_heap_size,
            "heap_size_limit": self.heap_size_limit,
            "external_memory": self.external_memory,
        })
        .to_string()
    }
}

fn new_global_context(isolate: &mut OwnedIsolate) -> Global<v8::Context> {
    v8::scope!(let scope, isolate);
    let context = v8::Context::new(scope, v8::ContextOptions::default());
    Global::new(scope, context)
}

fn exception_text(tc: &PinnedRef<'_, TryCatch<'_, '_, HandleScope<'_>>>) -> String {
    match tc.exception() {
        Some(exception) => marshal::to_rust_string(tc, exception),
        None => "unknown exception".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_arithmetic() {
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.eval("1 + 1"), "2");
    }

    #[test]
    fn eval_keeps_global_state() {
        let evaluator = Evaluator::new();
        evaluator.eval("var counter = 40;");
        assert_eq!(evaluator.eval("counter + 2"), "42");
    }

    #[test]
    fn eval_reports_compile_errors() {
        let evaluator = Evaluator::new();
        let result = evaluator.eval("syntax(");
        assert!(result.contains("SyntaxError"));
    }

    #[test]
    fn tagged_eval_distinguishes_failures() {
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.try_eval("[1, 2]").as_deref(), Ok("[1,2]"));
        assert!(matches!(
            evaluator.try_eval("nope("),
            Err(ScriptError::Compile(_))
        ));
        assert!(matches!(
            evaluator.try_eval("throw new Error('boom')"),
            Err(ScriptError::Exception(_))
        ));
    }

    #[test]
    fn thrown_errors_carry_their_message() {
        let evaluator = Evaluator::new();
        let result = evaluator.eval("throw new Error('boom')");
        assert!(result.contains("boom"));
    }

    #[test]
    fn heap_report_is_plausible() {
        let evaluator = Evaluator::new();
        evaluator.eval("var filler = new Array(1000).fill('x')");
        let report = evaluator.heap_report();
        assert!(report.used_heap_size > 0);
        assert!(report.used_heap_size <= report.total_heap_size);
        assert!(report.total_heap_size <= report.heap_size_limit);
    }
}
