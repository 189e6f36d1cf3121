//! # tack-settings
//!
//! Configuration management with layered sources for the tack gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`TackSettings::default()`]
//! 2. **User file** — `~/.tack/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `TACK_*` overrides (highest priority)
//!
//! The loader is side-effect free: the binary loads settings once at startup
//! and hands the result to whatever needs it. There is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
