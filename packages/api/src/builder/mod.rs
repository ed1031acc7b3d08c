//! Gate construction
//!
//! Configuration sources and pluggable backends are collected with a fluent
//! builder and checked together when the gate is built.

pub mod core;

pub use core::*;
