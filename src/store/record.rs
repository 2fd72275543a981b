// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Record shapes and their family tags.

/// Key identifier drawn from a dense integer range.
pub type Key = u64;

/// Byte length of a caption record.
pub const CAPTION_LEN: usize = 10;
/// Byte length of a post record.
pub const POST_LEN: usize = 20;
/// Byte length of a thumbnail record.
pub const THUMBNAIL_LEN: usize = 50;

/// A stored record: one payload shape per workload family.
///
/// The shape tag selects the store sub-map the record lives in, so the
/// schedulers run a single execute/apply path and let the record dispatch
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Scalar counter.
    Count(u64),
    /// Short string, fixed width.
    Caption([u8; CAPTION_LEN]),
    /// Medium string, fixed width.
    Post([u8; POST_LEN]),
    /// Fixed-size byte buffer.
    Thumbnail([u8; THUMBNAIL_LEN]),
}

impl Record {
    /// The family tag of this record.
    #[inline]
    pub fn family(&self) -> RecordFamily {
        match self {
            Record::Count(_) => RecordFamily::Count,
            Record::Caption(_) => RecordFamily::Caption,
            Record::Post(_) => RecordFamily::Post,
            Record::Thumbnail(_) => RecordFamily::Thumbnail,
        }
    }
}

/// Family tag carried by a transaction; selects the store sub-map all of its
/// reads and writes address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFamily {
    Count,
    Caption,
    Post,
    Thumbnail,
}

impl RecordFamily {
    /// All families, in sub-map order.
    pub const ALL: [RecordFamily; 4] = [
        RecordFamily::Count,
        RecordFamily::Caption,
        RecordFamily::Post,
        RecordFamily::Thumbnail,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_tag_matches_shape() {
        assert_eq!(Record::Count(3).family(), RecordFamily::Count);
        assert_eq!(
            Record::Caption([b'a'; CAPTION_LEN]).family(),
            RecordFamily::Caption
        );
        assert_eq!(Record::Post([b'a'; POST_LEN]).family(), RecordFamily::Post);
        assert_eq!(
            Record::Thumbnail([b'a'; THUMBNAIL_LEN]).family(),
            RecordFamily::Thumbnail
        );
    }
}
