//! fOS JavaScript Host
//!
//! QuickJS-based script host for the element loader, with minimal footprint.
//!
//! Features:
//! - CommonJS-style modules (`module`, `exports`, `require`)
//! - Global scripts for `window/` directories
//! - Console API forwarded to `tracing`

mod console;
mod host;

pub use host::{JsExports, QuickJsHost, QuickJsModule};
