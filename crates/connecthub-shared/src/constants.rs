/// Application name
pub const APP_NAME: &str = "ConnectHub";

/// Minimum combined match score (0-100) for a candidate to appear in the
/// "Recommended" tab.
pub const RECOMMENDATION_SCORE_FLOOR: u8 = 15;

/// Display weighting of the exact-interest-overlap component, in percent.
/// The real blend lives in the remote scoring procedure; this only labels
/// the breakdown shown to the user.
pub const EXACT_MATCH_WEIGHT_PCT: u8 = 60;

/// Display weighting of the AI semantic-similarity component, in percent.
pub const AI_MATCH_WEIGHT_PCT: u8 = 40;

/// Exact-overlap score (0..1) above which the match reason cites shared
/// interests by name.
pub const STRONG_EXACT_MATCH: f64 = 0.5;

/// AI score (0..1) above which the match reason cites semantic similarity.
pub const STRONG_AI_MATCH: f64 = 0.6;

/// How many distinct hobby tags the discover filter palette shows.
pub const INTEREST_FILTER_LIMIT: usize = 10;

/// Object-storage bucket for profile avatars.
pub const AVATAR_BUCKET: &str = "user_avatars";

/// Maximum avatar upload size in bytes (1 MiB).
pub const MAX_AVATAR_BYTES: usize = 1024 * 1024;

/// Minimum username length.
pub const MIN_USERNAME_LEN: usize = 3;

/// Minimum password length at signup.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Minimum number of interests selected during onboarding.
pub const MIN_INTERESTS: usize = 3;

/// Maximum bio length in characters.
pub const MAX_BIO_LEN: usize = 160;

/// Page size for message-thread loads.
pub const MESSAGE_PAGE_SIZE: u32 = 50;

/// Realtime channel heartbeat interval in seconds.
pub const REALTIME_HEARTBEAT_SECS: u64 = 30;

/// Delay before the realtime task attempts to reconnect, in seconds.
pub const REALTIME_RECONNECT_SECS: u64 = 3;
