//! HTTP `Range` header parsing.
//!
//! Only single byte ranges are supported:
//! - `bytes=0-499`
//! - `bytes=500-` (to the end of the resource)
//! - `bytes=-500` (last 500 bytes)
//!
//! Anything else, including multi-range requests, is rejected.

use crate::error::RangeError;

/// Inclusive byte interval inside a resource of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// The range covering a whole resource, or `None` for an empty one.
    pub fn full(resource_length: u64) -> Option<Self> {
        resource_length.checked_sub(1).map(|end| Self { start: 0, end })
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false: a range holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a partial response.
    pub fn content_range(&self, resource_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, resource_length)
    }
}

/// Parse a `Range` header value against a resource of `resource_length` bytes.
///
/// Bounds are clamped before validation: a suffix longer than the resource
/// starts at 0 and an end past the last byte is pulled back to it. If the
/// clamped start still lies after the end the range is unsatisfiable.
pub fn parse_range(value: &str, resource_length: u64) -> Result<ByteRange, RangeError> {
    let range_set = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::MissingUnit)?;

    if range_set.contains(',') {
        return Err(RangeError::MultipleRanges);
    }

    let parts: Vec<&str> = range_set.split('-').collect();
    if parts.len() != 2 {
        return Err(RangeError::Malformed);
    }

    let first = parts[0].trim();
    let second = parts[1].trim();

    // Signed so a suffix longer than the resource can go negative before clamping.
    let length = i128::from(resource_length);
    let (start, end) = match (first.is_empty(), second.is_empty()) {
        (true, true) => return Err(RangeError::Malformed),
        (true, false) => {
            let suffix = parse_bound(second)?;
            (length - suffix, length - 1)
        }
        (false, true) => (parse_bound(first)?, length - 1),
        (false, false) => (parse_bound(first)?, parse_bound(second)?),
    };

    let start = start.max(0);
    let end = end.min(length - 1);
    if start > end {
        return Err(RangeError::Unsatisfiable);
    }

    // Both bounds now lie in [0, resource_length).
    Ok(ByteRange {
        start: start as u64,
        end: end as u64,
    })
}

fn parse_bound(value: &str) -> Result<i128, RangeError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    value
        .parse::<u64>()
        .map(i128::from)
        .map_err(|_| RangeError::Malformed)
}
