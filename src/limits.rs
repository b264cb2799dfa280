use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Shortest window a trainer may request.
pub const MIN_BOOKING_DURATION_MS: Ms = HOUR_MS;
/// Longest single booking (30 days).
pub const MAX_BOOKING_DURATION_MS: Ms = 30 * 24 * HOUR_MS;
/// Widest window accepted by the availability query (90 days).
pub const MAX_QUERY_WINDOW_MS: Ms = 90 * 24 * HOUR_MS;

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_REG_NO_LEN: usize = 32;
pub const MAX_PURPOSE_LEN: usize = 512;
pub const MAX_NOTES_LEN: usize = 2048;
pub const MAX_MESSAGE_LEN: usize = 4096;
pub const MAX_DIRECT_RECIPIENTS: usize = 64;

pub const MAX_VEHICLES: usize = 10_000;
pub const MAX_USERS: usize = 50_000;
pub const MAX_BOOKINGS_PER_VEHICLE: usize = 100_000;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const COMPACT_CHECK_INTERVAL_SECS: u64 = 60;
