//! UI layer for desktop GUI: app shell, markdown story view, and themes.

pub mod app;
pub mod markdown;
pub mod theme;

pub use app::{NovelStudioApp, StartupConfig};
