//! Shared UI icons.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");

// Phase indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>] ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[-] ");
pub static BLOCKED: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK] ");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T] ");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[STOP] ");
