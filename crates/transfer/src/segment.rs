//! Partitioning of a contiguous byte range into transfer parts.

use std::iter::FusedIterator;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use keel_store::ByteRange;

use crate::TransferConfig;

/// One part of a [`SegmentedBufferView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufPart {
    /// Logical (object) offset of the first byte.
    pub start: u64,
    /// Logical offset one past the last byte.
    pub end: u64,
    /// Position of the first byte in the caller's buffer.
    pub offset: usize,
}

impl BufPart {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The object range this part covers.
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.end)
    }

    /// The slice of the caller's buffer this part covers.
    pub fn buf_range(&self) -> Range<usize> {
        self.offset..self.offset + self.len() as usize
    }
}

/// A view of `total_size` bytes starting at logical offset `start`, cut into
/// parts of `segment_size` bytes (the last part may be shorter).
///
/// The view borrows nothing: it only describes the partition. Pair it with
/// [`split_bytes`](Self::split_bytes) or [`split_mut`](Self::split_mut) to
/// obtain owned, disjoint buffers per part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentedBufferView {
    start: u64,
    total_size: u64,
    segment_size: u64,
}

impl SegmentedBufferView {
    /// # Panics
    ///
    /// Panics if `segment_size` is zero for a non-empty view, or if the
    /// logical range overflows `u64`.
    pub fn new(start: u64, total_size: u64, segment_size: u64) -> Self {
        assert!(
            total_size == 0 || segment_size > 0,
            "segment size must be positive for a {total_size}-byte view"
        );
        assert!(
            start.checked_add(total_size).is_some(),
            "view [{start}, +{total_size}) overflows"
        );
        Self {
            start,
            total_size,
            segment_size,
        }
    }

    /// Builds the view for a transfer, choosing the segment size.
    ///
    /// The default part size is used unless it would take more than
    /// `max_parts` parts. Then the segment grows to the smallest size that
    /// fits within `max_parts`, which must land strictly between the minimum
    /// and maximum part sizes.
    ///
    /// # Panics
    ///
    /// Panics when the recomputed segment size is out of bounds: no legal
    /// partition exists for such a transfer.
    pub fn for_transfer(start: u64, total_size: u64, config: &TransferConfig) -> Self {
        let mut segment_size = config.default_part_size;
        if total_size.div_ceil(segment_size) > config.max_parts {
            segment_size = total_size.div_ceil(config.max_parts);
            assert!(
                segment_size > config.min_part_size && segment_size < config.max_part_size,
                "cannot split {total_size} bytes into at most {} parts: segment size \
                 {segment_size} outside ({}, {})",
                config.max_parts,
                config.min_part_size,
                config.max_part_size,
            );
        }
        Self::new(start, total_size, segment_size)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Number of parts the view yields.
    pub fn num_segments(&self) -> usize {
        if self.total_size == 0 {
            0
        } else {
            self.total_size.div_ceil(self.segment_size) as usize
        }
    }

    /// Iterates the parts in ascending order. Each call starts over.
    pub fn iter(&self) -> Parts {
        Parts {
            base: self.start,
            next: self.start,
            end: self.start + self.total_size,
            segment_size: self.segment_size,
        }
    }

    /// Slices `data` into one shared buffer per part.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not exactly `total_size` bytes long.
    pub fn split_bytes(&self, data: &Bytes) -> Vec<(BufPart, Bytes)> {
        assert_eq!(
            data.len() as u64,
            self.total_size,
            "buffer does not match the view"
        );
        self.iter()
            .map(|part| (part, data.slice(part.buf_range())))
            .collect()
    }

    /// Splits `buf` into disjoint, independently owned pieces, one per part.
    /// The pieces can be rejoined with [`BytesMut::unsplit`] in order.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is not exactly `total_size` bytes long.
    pub fn split_mut(&self, mut buf: BytesMut) -> Vec<(BufPart, BytesMut)> {
        assert_eq!(
            buf.len() as u64,
            self.total_size,
            "buffer does not match the view"
        );
        let mut pieces = Vec::with_capacity(self.num_segments());
        for part in self.iter() {
            let piece = buf.split_to(part.len() as usize);
            pieces.push((part, piece));
        }
        pieces
    }
}

impl<'a> IntoIterator for &'a SegmentedBufferView {
    type Item = BufPart;
    type IntoIter = Parts;

    fn into_iter(self) -> Parts {
        self.iter()
    }
}

/// Iterator over the parts of a [`SegmentedBufferView`].
#[derive(Debug, Clone)]
pub struct Parts {
    base: u64,
    next: u64,
    end: u64,
    segment_size: u64,
}

impl Iterator for Parts {
    type Item = BufPart;

    fn next(&mut self) -> Option<BufPart> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.segment_size).min(self.end);
        self.next = end;
        Some(BufPart {
            start,
            end,
            offset: (start - self.base) as usize,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next >= self.end {
            0
        } else {
            (self.end - self.next).div_ceil(self.segment_size) as usize
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Parts {}

impl FusedIterator for Parts {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GIB, MIB};
    use rand::Rng;

    fn assert_partition(view: &SegmentedBufferView) {
        let parts: Vec<BufPart> = view.iter().collect();
        assert_eq!(parts.len(), view.num_segments());
        if view.is_empty() {
            assert!(parts.is_empty());
            return;
        }
        assert_eq!(parts[0].start, view.start());
        assert_eq!(parts[0].offset, 0);
        assert_eq!(parts.last().unwrap().end, view.start() + view.total_size());
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[0].len(), view.segment_size());
        }
        for part in &parts {
            assert!(!part.is_empty());
            assert!(part.len() <= view.segment_size());
            assert_eq!(part.offset as u64, part.start - view.start());
        }
        let covered: u64 = parts.iter().map(BufPart::len).sum();
        assert_eq!(covered, view.total_size());
    }

    #[test]
    fn parts_cover_range_exactly() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let start = rng.gen_range(0..1_000_000u64);
            let total = rng.gen_range(0..100_000u64);
            let segment = rng.gen_range(1..5_000u64);
            assert_partition(&SegmentedBufferView::new(start, total, segment));
        }
    }

    #[test]
    fn zero_size_yields_nothing() {
        let view = SegmentedBufferView::new(42, 0, 8);
        assert_eq!(view.iter().count(), 0);
        assert_eq!(view.num_segments(), 0);

        let view = SegmentedBufferView::for_transfer(0, 0, &TransferConfig::default());
        assert!(view.is_empty());
        assert_eq!(view.iter().len(), 0);
    }

    #[test]
    fn iteration_restarts() {
        let view = SegmentedBufferView::new(10, 25, 10);
        let first: Vec<_> = view.iter().collect();
        let second: Vec<_> = (&view).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                BufPart {
                    start: 10,
                    end: 20,
                    offset: 0,
                },
                BufPart {
                    start: 20,
                    end: 30,
                    offset: 10,
                },
                BufPart {
                    start: 30,
                    end: 35,
                    offset: 20,
                },
            ]
        );
    }

    #[test]
    fn exact_size_tracks_progress() {
        let view = SegmentedBufferView::new(0, 100, 30);
        let mut parts = view.iter();
        assert_eq!(parts.len(), 4);
        parts.next();
        assert_eq!(parts.len(), 3);
        parts.by_ref().for_each(drop);
        assert_eq!(parts.len(), 0);
        assert!(parts.next().is_none());
    }

    #[test]
    fn default_part_size_for_ordinary_transfers() {
        let config = TransferConfig::default();
        let view = SegmentedBufferView::for_transfer(0, 50 * MIB, &config);
        assert_eq!(view.segment_size(), 8 * MIB);
        assert_eq!(view.num_segments(), 7);
        let last = view.iter().last().unwrap();
        assert_eq!(last.len(), 2 * MIB);
    }

    #[test]
    fn segment_grows_to_respect_part_limit() {
        let config = TransferConfig::default();
        // 10000 default parts fit exactly; one more byte needs bigger parts.
        let exact = SegmentedBufferView::for_transfer(0, 10_000 * 8 * MIB, &config);
        assert_eq!(exact.segment_size(), 8 * MIB);
        assert_eq!(exact.num_segments(), 10_000);

        let total = 10_000 * 8 * MIB + 1;
        let grown = SegmentedBufferView::for_transfer(0, total, &config);
        assert!(grown.segment_size() > 8 * MIB);
        assert!(grown.num_segments() as u64 <= config.max_parts);
        assert_partition(&grown);
    }

    #[test]
    fn part_limit_respected_with_small_knobs() {
        let config = TransferConfig {
            min_part_size: 4,
            default_part_size: 8,
            max_part_size: 1_000,
            max_parts: 7,
            ..TransferConfig::default()
        };
        for total in 57..2_000u64 {
            let view = SegmentedBufferView::for_transfer(3, total, &config);
            assert!(view.num_segments() as u64 <= config.max_parts, "total {total}");
            assert!(view.segment_size() >= config.min_part_size);
            assert!(view.segment_size() <= config.max_part_size);
            assert_partition(&view);
        }
    }

    #[test]
    #[should_panic(expected = "cannot split")]
    fn oversized_transfer_panics() {
        let config = TransferConfig::default();
        SegmentedBufferView::for_transfer(0, 10_000 * 5 * GIB, &config);
    }

    #[test]
    fn split_bytes_matches_parts() {
        let data = Bytes::from((0..=255u8).cycle().take(1000).collect::<Vec<u8>>());
        let view = SegmentedBufferView::new(0, 1000, 300);
        let pieces = view.split_bytes(&data);
        assert_eq!(pieces.len(), 4);
        for (part, piece) in &pieces {
            assert_eq!(&piece[..], &data[part.buf_range()]);
        }
    }

    #[test]
    fn split_mut_pieces_rejoin() {
        let view = SegmentedBufferView::new(500, 10, 4);
        let pieces = view.split_mut(BytesMut::zeroed(10));
        let mut filled: Vec<BytesMut> = pieces
            .into_iter()
            .map(|(part, mut piece)| {
                piece.fill(part.start as u8);
                piece
            })
            .collect();
        let mut whole = filled.remove(0);
        for piece in filled {
            whole.unsplit(piece);
        }
        let expected: Vec<u8> = [244u8; 4]
            .into_iter()
            .chain([248u8; 4])
            .chain([252u8; 2])
            .collect();
        assert_eq!(&whole[..], &expected[..]);
    }

    #[test]
    #[should_panic(expected = "buffer does not match")]
    fn split_rejects_wrong_length() {
        let view = SegmentedBufferView::new(0, 10, 4);
        view.split_mut(BytesMut::zeroed(9));
    }
}
