//! JSON boundary between engine values and protocol strings.

use v8::{Local, PinScope, Value};

/// Engine-side `JSON.stringify`. Values the engine cannot stringify
/// degrade to the empty string, which the flat protocol reports as
/// success.
pub(crate) fn stringify(scope: &PinScope, value: Local<Value>) -> String {
    match v8::json::stringify(scope, value) {
        Some(text) => text.to_rust_string_lossy(scope),
        None => {
            log::debug!("result could not be stringified, returning an empty string");
            String::new()
        }
    }
}

/// Engine-side `JSON.parse`. `None` when the text is not valid JSON; the
/// pending exception is left for the caller's trap.
pub(crate) fn parse<'s>(scope: &PinScope<'s, '_>, text: &str) -> Option<Local<'s, Value>> {
    let text = v8::String::new(scope, text)?;
    v8::json::parse(scope, text)
}

/// Lossy UTF-8 rendition of any engine value.
pub(crate) fn to_rust_string(scope: &PinScope, value: Local<Value>) -> String {
    value.to_rust_string_lossy(scope)
}
