//! Keep-1-of-N record sampling, applied in place on a read buffer.
//!
//! A record's fate is decided by how many delimiters preceded it: the span
//! up to and including the next delimiter is kept iff the window position
//! is 0. Because every kept span ends with the delimiter that opens the
//! following record, the retained output is itself a well-formed sequence
//! of delimiter-prefixed records.
//!
//! Example with `keep_every = 2` and `D` as the delimiter:
//!
//! ```text
//! input:  query1\nDquery2\nDquery3
//! output: query1\nDquery3
//! ```

use crate::error::TailResult;
use crate::matcher::StreamMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Drop everything until the first delimiter, then start at `Window(0)`.
    SkipLeading,
    /// Slot of the current record within the keep-1-of-N window.
    Window(usize),
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    matcher: StreamMatcher,
    keep_every: usize,
    position: Position,
}

impl RateLimiter {
    /// `rate_limit` below 1 is treated as 1 (no limiting).
    pub fn new(delimiter: &[u8], rate_limit: usize) -> TailResult<Self> {
        Ok(Self {
            matcher: StreamMatcher::new(delimiter)?,
            keep_every: rate_limit.max(1),
            position: Position::Window(0),
        })
    }

    /// Discard bytes up to and including the next delimiter. Used right
    /// after a stream starts, where the first record is likely a fragment.
    pub fn skip_leading(&mut self) {
        self.position = Position::SkipLeading;
    }

    /// True when [`compact`](RateLimiter::compact) would keep every byte.
    pub fn is_passthrough(&self) -> bool {
        self.keep_every == 1 && self.position != Position::SkipLeading
    }

    pub fn keep_every(&self) -> usize {
        self.keep_every
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn delimiter(&self) -> &[u8] {
        self.matcher.delimiter()
    }

    /// Rewrite `buf` so that only bytes of kept records remain, packed at the
    /// front. Returns the retained length.
    ///
    /// A trailing record with no delimiter yet is kept or dropped according
    /// to the current window slot; the next call continues it consistently.
    pub fn compact(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len();
        let mut dest = 0;
        let mut next = 0;

        while next < len {
            let n = self.matcher.feed(&buf[next..]);

            if self.position == Position::Window(0) {
                if dest != next {
                    buf.copy_within(next..next + n, dest);
                }
                dest += n;
            }
            next += n;

            if self.matcher.found() {
                self.position = match self.position {
                    Position::SkipLeading => Position::Window(0),
                    Position::Window(k) => Position::Window((k + 1) % self.keep_every),
                };
                self.matcher.reset();
            }
        }

        dest
    }
}

/// Clamp a user-supplied rate limit to the valid range (`>= 1`).
pub fn clamp_rate_limit(value: i64) -> usize {
    if value < 1 {
        1
    } else {
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_DELIMITER as DELIM;

    fn records(count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..count {
            out.extend_from_slice(DELIM);
            out.extend_from_slice(format!("r{}\nQ{}\n", i, i).as_bytes());
        }
        out
    }

    fn compact_vec(limiter: &mut RateLimiter, input: &[u8]) -> Vec<u8> {
        let mut buf = input.to_vec();
        let n = limiter.compact(&mut buf);
        buf.truncate(n);
        buf
    }

    // ── fast path & clamping ────────────────────────────────────

    #[test]
    fn test_rate_limit_below_one_is_clamped() {
        let limiter = RateLimiter::new(DELIM, 0).unwrap();
        assert_eq!(limiter.keep_every(), 1);
        assert!(limiter.is_passthrough());
    }

    #[test]
    fn test_clamp_rate_limit() {
        assert_eq!(clamp_rate_limit(0), 1);
        assert_eq!(clamp_rate_limit(-5), 1);
        assert_eq!(clamp_rate_limit(1), 1);
        assert_eq!(clamp_rate_limit(7), 7);
    }

    #[test]
    fn test_skip_leading_disables_passthrough() {
        let mut limiter = RateLimiter::new(DELIM, 1).unwrap();
        limiter.skip_leading();
        assert!(!limiter.is_passthrough());
    }

    #[test]
    fn test_keep_all_is_idempotent() {
        let mut limiter = RateLimiter::new(DELIM, 1).unwrap();
        let input = records(5);
        let mut buf = input.clone();

        let n = limiter.compact(&mut buf);
        assert_eq!(n, input.len());
        assert_eq!(buf, input);

        let n = limiter.compact(&mut buf[..n]);
        assert_eq!(n, input.len());
        assert_eq!(buf, input);
    }

    // ── leading fragment ────────────────────────────────────────

    #[test]
    fn test_skip_leading_drops_fragment_and_keeps_next_record() {
        let mut limiter = RateLimiter::new(DELIM, 1).unwrap();
        limiter.skip_leading();

        let out = compact_vec(&mut limiter, b"ragment of q0\n# User@Host: a\nQ1\n");
        assert_eq!(out, b"a\nQ1\n");
        assert_eq!(limiter.position(), Position::Window(0));
        assert!(limiter.is_passthrough());
    }

    #[test]
    fn test_skip_leading_without_delimiter_drops_everything() {
        let mut limiter = RateLimiter::new(DELIM, 3).unwrap();
        limiter.skip_leading();

        assert!(compact_vec(&mut limiter, b"still the same old record").is_empty());
        assert_eq!(limiter.position(), Position::SkipLeading);
    }

    #[test]
    fn test_skip_leading_with_delimiter_split_across_calls() {
        let mut limiter = RateLimiter::new(DELIM, 1).unwrap();
        limiter.skip_leading();

        assert!(compact_vec(&mut limiter, b"old\n# User@").is_empty());
        assert_eq!(compact_vec(&mut limiter, b"Host: a\nQ1\n"), b"a\nQ1\n");
    }

    // ── periodicity ─────────────────────────────────────────────

    #[test]
    fn test_keeps_one_of_every_n_after_leading_skip() {
        let mut limiter = RateLimiter::new(DELIM, 3).unwrap();
        limiter.skip_leading();

        let mut input = b"junk\n".to_vec();
        input.extend(records(7));

        let out = compact_vec(&mut limiter, &input);
        assert_eq!(
            out,
            b"r0\nQ0\n# User@Host: r3\nQ3\n# User@Host: r6\nQ6\n".to_vec()
        );
    }

    #[test]
    fn test_window_counts_span_before_first_delimiter() {
        // Bytes before the first delimiter occupy slot 0 of the window.
        let mut limiter = RateLimiter::new(DELIM, 2).unwrap();
        let out = compact_vec(&mut limiter, &records(4));
        assert_eq!(out, b"# User@Host: r1\nQ1\n# User@Host: r3\nQ3\n".to_vec());
    }

    #[test]
    fn test_retained_count_for_various_rates() {
        for keep_every in 1..=6 {
            for count in 0..=13 {
                let mut limiter = RateLimiter::new(DELIM, keep_every).unwrap();
                limiter.skip_leading();

                let out = compact_vec(&mut limiter, &records(count));

                // Every kept span carries the delimiter that follows it,
                // except when the kept record is the last one in the buffer.
                let mut expected = Vec::new();
                for i in (0..count).step_by(keep_every) {
                    expected.extend_from_slice(format!("r{}\nQ{}\n", i, i).as_bytes());
                    if i + 1 < count {
                        expected.extend_from_slice(DELIM);
                    }
                }

                assert_eq!(out, expected, "keep_every={} count={}", keep_every, count);
            }
        }
    }

    // ── chunk boundaries ────────────────────────────────────────

    #[test]
    fn test_partial_record_continues_on_next_call() {
        let mut limiter = RateLimiter::new(DELIM, 2).unwrap();

        assert_eq!(compact_vec(&mut limiter, b"kept rec"), b"kept rec");
        assert_eq!(
            compact_vec(&mut limiter, b"ord\n# User@Host: dropped\n"),
            b"ord\n# User@Host: "
        );
        assert!(compact_vec(&mut limiter, b"still dropped\n").is_empty());
        assert_eq!(
            compact_vec(&mut limiter, b"# User@Host: kept\n"),
            b"kept\n"
        );
    }

    #[test]
    fn test_output_independent_of_chunk_size() {
        let mut input = b"leading fragment\n".to_vec();
        input.extend(records(9));

        let mut whole = RateLimiter::new(DELIM, 2).unwrap();
        whole.skip_leading();
        let expected = compact_vec(&mut whole, &input);

        for size in 1..=input.len() {
            let mut limiter = RateLimiter::new(DELIM, 2).unwrap();
            limiter.skip_leading();

            let mut out = Vec::new();
            for chunk in input.chunks(size) {
                out.extend(compact_vec(&mut limiter, chunk));
            }
            assert_eq!(out, expected, "chunk size {}", size);
        }
    }
}
