//! System-wide constants for the escrow settlement engine.

use std::time::Duration;

/// Default asset label used in logs and snapshots.
pub const DEFAULT_ASSET: &str = "USDC";

/// Default upper bound on an agreement's `max_duration` (365 days).
pub const DEFAULT_MAX_HORIZON: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default number of notifications kept in an engine's journal.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1_024;

/// Maximum decimal places accepted for amounts. Amounts are whole minor units.
pub const AMOUNT_SCALE: u32 = 0;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "escrow-settlement";
