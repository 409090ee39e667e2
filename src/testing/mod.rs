//! Testing utilities and mock implementations
//!
//! Lets sessions run against a scripted connector instead of a real server.

pub mod mocks;

pub use mocks::*;
