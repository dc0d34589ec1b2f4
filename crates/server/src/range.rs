#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a 206 response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Invalid,
    Unsatisfiable,
}

/// Parses a single-range `Range` header against a known file size.
/// Multi-range requests are rejected; an over-long closed range is
/// clamped to the end of the file.
pub fn parse_range_header(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let value = value.trim();
    let range = value.strip_prefix("bytes=").ok_or(RangeError::Invalid)?;

    if size == 0 {
        return Err(RangeError::Unsatisfiable);
    }
    if range.contains(',') {
        return Err(RangeError::Invalid);
    }

    if let Some(suffix) = range.strip_prefix('-') {
        if suffix.is_empty() {
            return Err(RangeError::Invalid);
        }
        let suffix: u64 = suffix.parse().map_err(|_| RangeError::Invalid)?;
        if suffix == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let (start_str, end_str) = range.split_once('-').ok_or(RangeError::Invalid)?;
    if start_str.is_empty() {
        return Err(RangeError::Invalid);
    }

    let start: u64 = start_str.parse().map_err(|_| RangeError::Invalid)?;
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }

    let end = if end_str.is_empty() {
        size - 1
    } else {
        let end: u64 = end_str.parse().map_err(|_| RangeError::Invalid)?;
        if end < start {
            return Err(RangeError::Invalid);
        }
        end.min(size - 1)
    };

    Ok(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::{parse_range_header, ByteRange, RangeError};

    #[test]
    fn parses_open_ended_range() {
        let range = parse_range_header("bytes=0-", 100).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 99 });
        assert_eq!(range.len(), 100);
    }

    #[test]
    fn parses_closed_range() {
        let range = parse_range_header("bytes=10-19", 100).unwrap();
        assert_eq!(range, ByteRange { start: 10, end: 19 });
        assert_eq!(range.content_range(100), "bytes 10-19/100");
    }

    #[test]
    fn clamps_end_overflow() {
        let range = parse_range_header("bytes=90-200", 100).unwrap();
        assert_eq!(range, ByteRange { start: 90, end: 99 });
    }

    #[test]
    fn parses_suffix_range() {
        let range = parse_range_header("bytes=-10", 100).unwrap();
        assert_eq!(range, ByteRange { start: 90, end: 99 });
    }

    #[test]
    fn long_suffix_covers_whole_file() {
        let range = parse_range_header("bytes=-500", 100).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 99 });
    }

    #[test]
    fn rejects_multiple_ranges() {
        let err = parse_range_header("bytes=0-1,2-3", 100).unwrap_err();
        assert_eq!(err, RangeError::Invalid);
    }

    #[test]
    fn rejects_invalid_range() {
        let err = parse_range_header("bytes=10-5", 100).unwrap_err();
        assert_eq!(err, RangeError::Invalid);
    }

    #[test]
    fn rejects_unsatisfiable() {
        let err = parse_range_header("bytes=100-", 100).unwrap_err();
        assert_eq!(err, RangeError::Unsatisfiable);
    }
}
