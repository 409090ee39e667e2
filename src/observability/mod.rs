//! Observability for the messaging client
//!
//! Structured logging setup and the span macros used by the session driver.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{connection_span, session_span};
