//! Live tailing of a growing, possibly rotated log file, with record-aware
//! down-sampling.

pub mod error;
pub mod file;
pub mod limit;
pub mod matcher;
pub mod stream;

pub use error::TailError;
pub use file::{FileSnapshot, TailOptions, TailState, TailedFile};
pub use limit::{clamp_rate_limit, RateLimiter};
pub use matcher::StreamMatcher;
pub use stream::{ContentReader, ContentStream, DEFAULT_BLOCK_SIZE};

/// Marker that opens every record of a MySQL slow-query log.
pub const DEFAULT_DELIMITER: &[u8] = b"# User@Host: ";
