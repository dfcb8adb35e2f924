//! Backend bridge: command queue types and the worker thread that drives generation.

pub mod commands;
pub mod runtime;
