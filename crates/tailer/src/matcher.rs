//! Incremental delimiter search over a byte stream delivered in arbitrary
//! chunks.
//!
//! The search is Knuth–Morris–Pratt driven one byte at a time, so partial
//! progress through the delimiter survives chunk boundaries without keeping
//! a copy of the previous chunk. While no prefix is pending, `memchr` jumps
//! straight to the next candidate first byte.

use memchr::memchr;

use crate::error::{TailError, TailResult};

#[derive(Debug, Clone)]
pub struct StreamMatcher {
    delimiter: Box<[u8]>,
    /// `failure[q]`: length of the longest proper prefix of `delimiter[..=q]`
    /// that is also its suffix.
    failure: Box<[usize]>,
    matched: usize,
    found: bool,
}

impl StreamMatcher {
    pub fn new(delimiter: &[u8]) -> TailResult<Self> {
        if delimiter.is_empty() {
            return Err(TailError::EmptyDelimiter);
        }

        Ok(Self {
            failure: failure_table(delimiter),
            delimiter: delimiter.into(),
            matched: 0,
            found: false,
        })
    }

    /// Consume `chunk` up to the end of the next complete delimiter.
    ///
    /// Returns the number of bytes consumed. If a delimiter completes inside
    /// `chunk`, the count stops right after its last byte and [`found`]
    /// turns true; otherwise the whole chunk is consumed. Once a match is
    /// reported nothing more is consumed until [`reset`] is called.
    ///
    /// [`found`]: StreamMatcher::found
    /// [`reset`]: StreamMatcher::reset
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        if self.found {
            return 0;
        }

        let needle = &self.delimiter;
        let mut i = 0;

        while i < chunk.len() {
            if self.matched == 0 {
                match memchr(needle[0], &chunk[i..]) {
                    Some(offset) => i += offset,
                    None => return chunk.len(),
                }
            }

            let byte = chunk[i];
            while self.matched > 0 && needle[self.matched] != byte {
                self.matched = self.failure[self.matched - 1];
            }
            if needle[self.matched] == byte {
                self.matched += 1;
            }
            i += 1;

            if self.matched == needle.len() {
                self.found = true;
                self.matched = 0;
                return i;
            }
        }

        chunk.len()
    }

    /// Whether the last [`feed`](StreamMatcher::feed) completed a delimiter.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Forget any match so the next region is searched independently.
    pub fn reset(&mut self) {
        self.matched = 0;
        self.found = false;
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }
}

fn failure_table(needle: &[u8]) -> Box<[usize]> {
    let mut table = vec![0; needle.len()];
    let mut k = 0;
    for q in 1..needle.len() {
        while k > 0 && needle[k] != needle[q] {
            k = table[k - 1];
        }
        if needle[k] == needle[q] {
            k += 1;
        }
        table[q] = k;
    }
    table.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIM: &[u8] = b"# User@Host: ";

    /// Feed `chunks` in order, resetting after every match, and count matches.
    fn count_matches(matcher: &mut StreamMatcher, chunks: &[&[u8]]) -> usize {
        let mut total = 0;
        for chunk in chunks {
            let mut rest = *chunk;
            while !rest.is_empty() {
                let n = matcher.feed(rest);
                rest = &rest[n..];
                if matcher.found() {
                    total += 1;
                    matcher.reset();
                }
            }
        }
        total
    }

    // ── construction ────────────────────────────────────────────

    #[test]
    fn test_empty_delimiter_rejected() {
        let result = StreamMatcher::new(b"");
        assert!(matches!(result, Err(TailError::EmptyDelimiter)));
    }

    #[test]
    fn test_failure_table() {
        assert_eq!(&*failure_table(b"abab"), &[0, 0, 1, 2]);
        assert_eq!(&*failure_table(b"aaab"), &[0, 1, 2, 0]);
        assert_eq!(&*failure_table(DELIM), &[0; 13]);
    }

    // ── single chunk ────────────────────────────────────────────

    #[test]
    fn test_feed_stops_after_delimiter() {
        let mut m = StreamMatcher::new(DELIM).unwrap();
        let data = b"Q1\n# User@Host: b\n";
        let n = m.feed(data);
        assert!(m.found());
        assert_eq!(n, 3 + DELIM.len());
        assert_eq!(&data[n - DELIM.len()..n], DELIM);
    }

    #[test]
    fn test_feed_without_delimiter_consumes_everything() {
        let mut m = StreamMatcher::new(DELIM).unwrap();
        assert_eq!(m.feed(b"SELECT 1;\n"), 10);
        assert!(!m.found());
    }

    #[test]
    fn test_feed_returns_zero_until_reset() {
        let mut m = StreamMatcher::new(b"ab").unwrap();
        assert_eq!(m.feed(b"xab"), 3);
        assert!(m.found());
        assert_eq!(m.feed(b"ab"), 0);

        m.reset();
        assert!(!m.found());
        assert_eq!(m.feed(b"ab"), 2);
        assert!(m.found());
    }

    #[test]
    fn test_self_overlapping_delimiter() {
        let mut m = StreamMatcher::new(b"aab").unwrap();
        assert_eq!(m.feed(b"aaab"), 4);
        assert!(m.found());

        let mut m = StreamMatcher::new(b"abab").unwrap();
        assert_eq!(m.feed(b"abababx"), 4);
        assert!(m.found());
    }

    #[test]
    fn test_single_byte_delimiter() {
        let mut m = StreamMatcher::new(b"\n").unwrap();
        assert_eq!(count_matches(&mut m, &[b"a\nb\n\nc"]), 3);
    }

    // ── split input ─────────────────────────────────────────────

    #[test]
    fn test_delimiter_split_across_chunks() {
        let mut m = StreamMatcher::new(DELIM).unwrap();
        assert_eq!(m.feed(b"Q1\n# User"), 9);
        assert!(!m.found());
        assert_eq!(m.feed(b"@Host: b"), 7);
        assert!(m.found());
    }

    #[test]
    fn test_false_start_across_chunks() {
        let mut m = StreamMatcher::new(DELIM).unwrap();
        assert_eq!(m.feed(b"# Use"), 5);
        assert_eq!(m.feed(b"# User@Host: "), 13);
        assert!(m.found());
    }

    #[test]
    fn test_delimiter_longer_than_every_chunk() {
        let mut m = StreamMatcher::new(DELIM).unwrap();
        let data = b"xx# User@Host: yy# User@Host: ";
        let chunks: Vec<&[u8]> = data.chunks(1).collect();
        assert_eq!(count_matches(&mut m, &chunks), 2);

        let chunks: Vec<&[u8]> = data.chunks(4).collect();
        let mut m = StreamMatcher::new(DELIM).unwrap();
        assert_eq!(count_matches(&mut m, &chunks), 2);
    }

    #[test]
    fn test_match_count_independent_of_split_points() {
        let data: &[u8] =
            b"tail of q0\n# User@Host: a\nQ1\n# User@Host: b\nQ2\n# User@Host: c\nQ3";

        for i in 0..=data.len() {
            for j in i..=data.len() {
                let mut m = StreamMatcher::new(DELIM).unwrap();
                let found = count_matches(&mut m, &[&data[..i], &data[i..j], &data[j..]]);
                assert_eq!(found, 3, "split at {} and {}", i, j);
            }
        }
    }
}
