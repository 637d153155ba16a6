//! Division of objects into multipart transfer parts.
//!
//! Pure logic, no I/O. Both the uploader and any client resuming a transfer
//! recompute part boundaries from the object size alone, so the division must
//! be deterministic.

use serde::{Deserialize, Serialize};
use tracing::debug;

use score_common::{MAX_PARTS, MIN_PART_SIZE};

use crate::error::StorageError;
use crate::types::ByteRange;

/// One contiguous segment of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// One-based part number.
    part_number: u32,
    /// Length of this part in bytes.
    part_size: u64,
    /// Byte offset within the object.
    offset: u64,
    /// Provider tag returned when the part was stored.
    etag: Option<String>,
    /// Digest of the part payload.
    digest: Option<String>,
}

impl Part {
    /// Create an incomplete part.
    pub fn new(part_number: u32, part_size: u64, offset: u64) -> Self {
        Self {
            part_number,
            part_size,
            offset,
            etag: None,
            digest: None,
        }
    }

    /// One-based part number.
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    /// Length of this part in bytes.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Byte offset within the object.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Provider tag, set once the part is stored.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Payload digest, set once the part is stored.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Byte range covered by this part.
    pub fn range(&self) -> ByteRange {
        ByteRange::with_len(self.offset, self.part_size)
    }

    /// True once the transfer of this part finished.
    pub fn is_completed(&self) -> bool {
        self.etag.is_some()
    }

    /// Record completion. A completed part never changes again.
    pub fn complete(
        &mut self,
        etag: impl Into<String>,
        digest: impl Into<String>,
    ) -> Result<(), StorageError> {
        if self.is_completed() {
            return Err(StorageError::PartAlreadyCompleted {
                part_number: self.part_number,
            });
        }
        self.etag = Some(etag.into());
        self.digest = Some(digest.into());
        Ok(())
    }
}

/// Splits an object size into at most `MAX_PARTS` parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartCalculator {
    /// Effective minimum part size (never below `MIN_PART_SIZE`).
    min_part_size: u64,
}

impl Default for PartCalculator {
    fn default() -> Self {
        Self::new(MIN_PART_SIZE)
    }
}

impl PartCalculator {
    /// Create a calculator. Minimums below 20 MiB are raised to 20 MiB.
    ///
    /// # Arguments
    /// * `configured_min` - Requested minimum part size in bytes
    pub fn new(configured_min: u64) -> Self {
        Self {
            min_part_size: configured_min.max(MIN_PART_SIZE),
        }
    }

    /// Effective minimum part size.
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Size of every part but the last for an object of `file_size` bytes.
    ///
    /// Grows beyond the minimum for huge objects so the count stays within
    /// `MAX_PARTS`.
    pub fn part_size_for(&self, file_size: u64) -> u64 {
        self.min_part_size.max(file_size / MAX_PARTS + 1)
    }

    /// Number of parts `divide` produces for `file_size`.
    pub fn expected_part_count(&self, file_size: u64) -> u64 {
        if file_size == 0 {
            return 0;
        }
        file_size.div_ceil(self.part_size_for(file_size))
    }

    /// Divide an object into ordered, contiguous parts.
    ///
    /// # Arguments
    /// * `file_size` - Object size in bytes
    ///
    /// # Returns
    /// Parts numbered from 1 starting at offset 0. Empty for a zero-length
    /// object.
    ///
    /// # Errors
    /// `StorageError::InvalidSize` if `file_size` is negative.
    pub fn divide(&self, file_size: i64) -> Result<Vec<Part>, StorageError> {
        if file_size < 0 {
            return Err(StorageError::InvalidSize { size: file_size });
        }

        let file_size: u64 = file_size as u64;
        let part_size: u64 = self.part_size_for(file_size);
        debug!("Part size: {}", part_size);

        let mut parts: Vec<Part> = Vec::new();
        let mut offset: u64 = 0;
        let mut part_number: u32 = 1;

        while offset < file_size {
            let size: u64 = part_size.min(file_size - offset);
            parts.push(Part::new(part_number, size, offset));
            offset += size;
            part_number += 1;
        }

        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use score_common::MIB;

    fn assert_well_formed(file_size: u64, parts: &[Part]) {
        assert!(parts.len() as u64 <= MAX_PARTS);
        assert_eq!(parts.iter().map(|p| p.part_size()).sum::<u64>(), file_size);
        if let Some(first) = parts.first() {
            assert_eq!(first.offset(), 0);
        }
        for (i, pair) in parts.windows(2).enumerate() {
            assert_eq!(pair[0].offset() + pair[0].part_size(), pair[1].offset());
            assert_eq!(pair[0].part_number() as usize, i + 1);
            assert_eq!(pair[1].part_number(), pair[0].part_number() + 1);
        }
        assert!(parts.iter().all(|p| p.part_size() > 0));
    }

    #[test]
    fn test_divide_45_mib() {
        let parts = PartCalculator::default().divide((45 * MIB) as i64).unwrap();
        let shape: Vec<(u32, u64, u64)> = parts
            .iter()
            .map(|p| (p.part_number(), p.part_size(), p.offset()))
            .collect();
        assert_eq!(
            shape,
            vec![(1, 20 * MIB, 0), (2, 20 * MIB, 20 * MIB), (3, 5 * MIB, 40 * MIB)]
        );
    }

    #[test]
    fn test_divide_zero_is_empty() {
        let parts = PartCalculator::default().divide(0).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn test_divide_negative_fails() {
        let err = PartCalculator::default().divide(-1).unwrap_err();
        assert_eq!(err, StorageError::InvalidSize { size: -1 });
    }

    #[test]
    fn test_divide_is_deterministic() {
        let calc = PartCalculator::new(32 * MIB);
        let size: i64 = (1_000 * MIB + 17) as i64;
        assert_eq!(calc.divide(size).unwrap(), calc.divide(size).unwrap());
    }

    #[test]
    fn test_configured_minimum_below_floor_is_raised() {
        assert_eq!(PartCalculator::new(1024).min_part_size(), MIN_PART_SIZE);
        assert_eq!(PartCalculator::new(64 * MIB).min_part_size(), 64 * MIB);
    }

    #[test]
    fn test_parts_are_contiguous_for_assorted_sizes() {
        let calc = PartCalculator::default();
        let sizes: [u64; 8] = [
            1,
            MIN_PART_SIZE - 1,
            MIN_PART_SIZE,
            MIN_PART_SIZE + 1,
            3 * MIN_PART_SIZE,
            MIN_PART_SIZE * MAX_PARTS,
            MIN_PART_SIZE * MAX_PARTS + 1,
            5 * 1024 * 1024 * MIB, // 5 TiB
        ];
        for size in sizes {
            let parts = calc.divide(size as i64).unwrap();
            assert_well_formed(size, &parts);
            assert_eq!(parts.len() as u64, calc.expected_part_count(size));
        }
    }

    #[test]
    fn test_huge_object_grows_part_size() {
        let calc = PartCalculator::default();
        let size: u64 = MIN_PART_SIZE * MAX_PARTS * 3;
        assert!(calc.part_size_for(size) > MIN_PART_SIZE);
        assert!(calc.expected_part_count(size) <= MAX_PARTS);
    }

    #[test]
    fn test_part_completion_is_immutable() {
        let mut part = Part::new(1, 10, 0);
        assert!(!part.is_completed());

        part.complete("etag-1", "digest-1").unwrap();
        assert!(part.is_completed());

        let err = part.complete("etag-2", "digest-2").unwrap_err();
        assert_eq!(err, StorageError::PartAlreadyCompleted { part_number: 1 });
        assert_eq!(part.etag(), Some("etag-1"));
        assert_eq!(part.digest(), Some("digest-1"));
    }

    #[test]
    fn test_completed_part_survives_serialization() {
        let mut part = Part::new(3, 20, 40);
        part.complete("etag-3", "digest-3").unwrap();

        let saved: String = serde_json::to_string(&part).unwrap();
        assert!(saved.contains("\"partNumber\":3"));
        let mut restored: Part = serde_json::from_str(&saved).unwrap();

        assert_eq!(restored, part);
        assert!(restored.complete("etag-4", "digest-4").is_err());
        assert_eq!(restored.etag(), Some("etag-3"));
    }

    #[test]
    fn test_part_range() {
        let part = Part::new(2, 20, 40);
        assert_eq!(part.range(), ByteRange::new(40, 60));
    }
}
