//! C boundary for the Kestrel evaluator.
//!
//! One flat function table over [`kestrel_v8`]: opaque evaluator handles,
//! NUL-terminated UTF-8 in, owned length-prefixed buffers out. Every
//! buffer returned here is released through [`kestrel_buf_free`]; nothing
//! aliases engine memory.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::OnceLock;

use kestrel_v8::{runtime, Evaluator};

/// Owned UTF-8 buffer handed across the boundary.
///
/// `data` points at `len` bytes followed by a terminating NUL. The
/// terminator is a convenience for C callers; `len` is authoritative, so
/// embedded NUL bytes survive the crossing.
#[repr(C)]
pub struct KestrelBuf {
    pub data: *mut c_char,
    pub len: usize,
}

impl KestrelBuf {
    fn from_string(text: String) -> Self {
        let len = text.len();
        let mut bytes = text.into_bytes();
        bytes.push(0);
        let raw = Box::into_raw(bytes.into_boxed_slice());
        Self {
            data: raw.cast::<c_char>(),
            len,
        }
    }

    fn empty() -> Self {
        Self::from_string(String::new())
    }
}

/// NULL is treated as the empty string, as the shim always has.
unsafe fn text_arg(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Forwards an engine flag string. Must precede [`kestrel_initialize`].
///
/// # Safety
/// `flags` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn kestrel_set_flags(flags: *const c_char) {
    runtime::set_flags(&text_arg(flags));
}

/// One-time engine bring-up. Returns false when already initialized.
#[no_mangle]
pub extern "C" fn kestrel_initialize() -> bool {
    runtime::initialize()
}

/// Engine teardown. Returns false when never initialized. All evaluators
/// must have been freed first.
#[no_mangle]
pub extern "C" fn kestrel_dispose() -> bool {
    runtime::dispose()
}

/// Engine version string. Static storage; the caller must not free it.
#[no_mangle]
pub extern "C" fn kestrel_version() -> *const c_char {
    static VERSION: OnceLock<CString> = OnceLock::new();
    VERSION
        .get_or_init(|| CString::new(runtime::version()).unwrap_or_default())
        .as_ptr()
}

/// Allocates an evaluator with its own isolate and a fresh context.
#[no_mangle]
pub extern "C" fn kestrel_new_evaluator() -> *mut Evaluator {
    Box::into_raw(Box::new(Evaluator::new()))
}

/// Destroys an evaluator. Safe on NULL.
///
/// # Safety
/// `evaluator` must be NULL or a handle from [`kestrel_new_evaluator`]
/// that has not been freed, with no operation on it in flight.
#[no_mangle]
pub unsafe extern "C" fn kestrel_free_evaluator(evaluator: *mut Evaluator) {
    if !evaluator.is_null() {
        drop(Box::from_raw(evaluator));
    }
}

/// Replaces the evaluator's context; the isolate survives. Safe on NULL.
///
/// # Safety
/// `evaluator` must be NULL or a live handle from [`kestrel_new_evaluator`].
#[no_mangle]
pub unsafe extern "C" fn kestrel_reset_evaluator(evaluator: *mut Evaluator) {
    if let Some(evaluator) = evaluator.as_ref() {
        evaluator.reset_context();
    }
}

/// Runs a script; see the library contract for the result shape. A NULL
/// evaluator yields an empty buffer.
///
/// # Safety
/// `evaluator` must be NULL or a live handle; `script` must be NULL or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn kestrel_eval(
    evaluator: *mut Evaluator,
    script: *const c_char,
) -> KestrelBuf {
    let Some(evaluator) = evaluator.as_ref() else {
        return KestrelBuf::empty();
    };
    KestrelBuf::from_string(evaluator.eval(&text_arg(script)))
}

/// Invokes a named global function with a JSON argument array.
///
/// # Safety
/// `evaluator` must be NULL or a live handle; `name` and `args` must be
/// NULL or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn kestrel_call(
    evaluator: *mut Evaluator,
    name: *const c_char,
    args: *const c_char,
) -> KestrelBuf {
    let Some(evaluator) = evaluator.as_ref() else {
        return KestrelBuf::empty();
    };
    KestrelBuf::from_string(evaluator.call(&text_arg(name), &text_arg(args)))
}

/// JSON heap statistics for the evaluator's isolate.
///
/// # Safety
/// `evaluator` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn kestrel_heap_report(evaluator: *mut Evaluator) -> KestrelBuf {
    let Some(evaluator) = evaluator.as_ref() else {
        return KestrelBuf::empty();
    };
    KestrelBuf::from_string(evaluator.heap_report().to_json())
}

/// Releases a buffer returned by this table.
///
/// # Safety
/// `buf` must come from this table and must not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn kestrel_buf_free(buf: KestrelBuf) {
    if buf.data.is_null() {
        return;
    }
    let raw = ptr::slice_from_raw_parts_mut(buf.data.cast::<u8>(), buf.len + 1);
    drop(Box::from_raw(raw));
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;

    fn buf_to_string(buf: KestrelBuf) -> String {
        let bytes = unsafe { std::slice::from_raw_parts(buf.data.cast::<u8>(), buf.len) }.to_vec();
        unsafe { kestrel_buf_free(buf) };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn eval_round_trip() {
        let evaluator = kestrel_new_evaluator();
        let script = CString::new("6 * 7").unwrap();
        let buf = unsafe { kestrel_eval(evaluator, script.as_ptr()) };
        assert_eq!(buf.len, 2);
        assert_eq!(buf_to_string(buf), "42");
        unsafe { kestrel_free_evaluator(evaluator) };
    }

    #[test]
    fn call_round_trip() {
        let evaluator = kestrel_new_evaluator();
        let define = CString::new("function mul(a, b) { return a * b; }").unwrap();
        unsafe { kestrel_buf_free(kestrel_eval(evaluator, define.as_ptr())) };

        let name = CString::new("mul").unwrap();
        let args = CString::new("[6, 7]").unwrap();
        let buf = unsafe { kestrel_call(evaluator, name.as_ptr(), args.as_ptr()) };
        assert_eq!(buf_to_string(buf), "42");
        unsafe { kestrel_free_evaluator(evaluator) };
    }

    #[test]
    fn reset_clears_definitions() {
        let evaluator = kestrel_new_evaluator();
        let define = CString::new("function f() { return 1; }").unwrap();
        unsafe { kestrel_buf_free(kestrel_eval(evaluator, define.as_ptr())) };

        unsafe { kestrel_reset_evaluator(evaluator) };

        let name = CString::new("f").unwrap();
        let args = CString::new("[]").unwrap();
        let buf = unsafe { kestrel_call(evaluator, name.as_ptr(), args.as_ptr()) };
        assert_eq!(buf_to_string(buf), "TypeError: 'f' is not a function");
        unsafe { kestrel_free_evaluator(evaluator) };
    }

    #[test]
    fn null_handles_are_tolerated() {
        unsafe { kestrel_free_evaluator(ptr::null_mut()) };
        unsafe { kestrel_reset_evaluator(ptr::null_mut()) };
        let buf = unsafe { kestrel_eval(ptr::null_mut(), ptr::null()) };
        assert_eq!(buf.len, 0);
        unsafe { kestrel_buf_free(buf) };
    }

    #[test]
    fn version_is_static_and_non_empty() {
        let first = kestrel_version();
        let second = kestrel_version();
        assert_eq!(first, second);
        let text = unsafe { CStr::from_ptr(first) }.to_str().unwrap();
        assert!(!text.is_empty());
    }

    #[test]
    fn heap_report_is_json() {
        let evaluator = kestrel_new_evaluator();
        let buf = unsafe { kestrel_heap_report(evaluator) };
        let text = buf_to_string(buf);
        assert!(text.starts_with('{'));
        assert!(text.contains("used_heap_size"));
        unsafe { kestrel_free_evaluator(evaluator) };
    }
}
