//! Array-sorted level-2 book

use crate::error::BookError;
use common::{Level2Point, Level2Snapshot, Level2Update};
use rust_decimal::Decimal;
use std::str::FromStr;

/// One price level held by [`Level2Book`].
///
/// The exchange's raw price/size strings are retained next to the parsed
/// ordering key: the checksum is defined over the lexical form the venue
/// published, not over any re-rendering of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookLevel {
    key: Decimal,
    /// Price exactly as the venue sent it
    pub price: String,
    /// Aggregate size exactly as the venue sent it
    pub size: String,
    /// Order count at the level, when the venue exposes it
    pub count: Option<u64>,
}

impl BookLevel {
    fn from_point(point: &Level2Point) -> Result<Self, BookError> {
        Ok(Self {
            key: parse_decimal(&point.price)?,
            price: point.price.clone(),
            size: point.size.clone(),
            count: point.count,
        })
    }

    fn to_point(&self) -> Level2Point {
        Level2Point {
            price: self.price.clone(),
            size: self.size.clone(),
            count: self.count,
        }
    }
}

/// Price-aggregated book rebuilt from a snapshot plus sequenced diffs.
///
/// Asks are kept sorted descending and bids ascending, so the best price
/// of each side (lowest ask, highest bid) sits at the tail of its array:
/// top-of-book access is O(1) and the common churn near the touch stays
/// at the cheap end. Each diff point is located by binary search; size
/// zero deletes the level, a known price updates in place, an unknown
/// price with positive size is inserted at its sorted position.
#[derive(Clone, Debug)]
pub struct Level2Book {
    exchange: String,
    base: String,
    quote: String,
    /// Asks sorted descending; best (lowest) at the tail
    asks: Vec<BookLevel>,
    /// Bids sorted ascending; best (highest) at the tail
    bids: Vec<BookLevel>,
    sequence_id: Option<u64>,
    timestamp_ms: Option<u64>,
}

impl Level2Book {
    /// Build a book from a full snapshot.
    pub fn from_snapshot(snapshot: &Level2Snapshot) -> Result<Self, BookError> {
        let mut asks = snapshot
            .asks
            .iter()
            .map(BookLevel::from_point)
            .collect::<Result<Vec<_>, _>>()?;
        let mut bids = snapshot
            .bids
            .iter()
            .map(BookLevel::from_point)
            .collect::<Result<Vec<_>, _>>()?;
        asks.sort_by(|a, b| b.key.cmp(&a.key));
        bids.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self {
            exchange: snapshot.exchange.clone(),
            base: snapshot.base.clone(),
            quote: snapshot.quote.clone(),
            asks,
            bids,
            sequence_id: snapshot.sequence_id,
            timestamp_ms: snapshot.timestamp_ms,
        })
    }

    /// Sequence id of the last applied snapshot or diff.
    #[must_use]
    pub fn sequence_id(&self) -> Option<u64> {
        self.sequence_id
    }

    /// Best (lowest) ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.last()
    }

    /// Best (highest) bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.last()
    }

    /// Number of levels per side as `(asks, bids)`.
    #[must_use]
    pub fn depth(&self) -> (usize, usize) {
        (self.asks.len(), self.bids.len())
    }

    /// Apply a diff without sequence enforcement.
    ///
    /// Used on venues that publish unsequenced diffs; the book adopts the
    /// diff's sequence id when it carries one. All points are validated
    /// before any mutation, so a malformed diff leaves the book intact.
    pub fn update(&mut self, diff: &Level2Update) -> Result<(), BookError> {
        let asks = parse_points(&diff.asks)?;
        let bids = parse_points(&diff.bids)?;

        for (key, point) in asks {
            apply_point(&mut self.asks, SideOrder::Descending, key, point);
        }
        for (key, point) in bids {
            apply_point(&mut self.bids, SideOrder::Ascending, key, point);
        }
        if diff.sequence_id.is_some() {
            self.sequence_id = diff.sequence_id;
        }
        if diff.timestamp_ms.is_some() {
            self.timestamp_ms = diff.timestamp_ms;
        }
        Ok(())
    }

    /// Apply a diff, requiring it to be the immediate successor of the
    /// last applied sequence id.
    ///
    /// A stale diff (already covered) reports [`BookError::StaleUpdate`];
    /// a diff that skips ahead reports [`BookError::SequenceGap`]. Either
    /// way the book is untouched — on a gap the caller must discard the
    /// book and request a fresh snapshot, the book never self-heals.
    pub fn apply_sequenced(&mut self, diff: &Level2Update) -> Result<(), BookError> {
        let got = diff.sequence_id.ok_or(BookError::MissingSequence)?;
        let last = self.sequence_id.unwrap_or(0);
        if got <= last {
            return Err(BookError::StaleUpdate { last, got });
        }
        if got != last + 1 {
            return Err(BookError::SequenceGap {
                expected: last + 1,
                got,
            });
        }
        self.update(diff)
    }

    /// Render the top `depth` levels per side as a snapshot, best first.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> Level2Snapshot {
        Level2Snapshot {
            exchange: self.exchange.clone(),
            base: self.base.clone(),
            quote: self.quote.clone(),
            sequence_id: self.sequence_id,
            timestamp_ms: self.timestamp_ms,
            asks: self.asks.iter().rev().take(depth).map(BookLevel::to_point).collect(),
            bids: self.bids.iter().rev().take(depth).map(BookLevel::to_point).collect(),
        }
    }

    /// CRC32 checksum over the top `depth` levels, venue style.
    ///
    /// Concatenates price then size for the best `depth` asks followed by
    /// the best `depth` bids, each string with its decimal point removed
    /// and leading zeros stripped, and returns the CRC32 of the result —
    /// comparable against the checksum the venue publishes to detect a
    /// silently desynced book.
    #[must_use]
    pub fn checksum(&self, depth: usize) -> u32 {
        let mut digest = String::new();
        for level in self.asks.iter().rev().take(depth) {
            push_checksum_field(&mut digest, &level.price);
            push_checksum_field(&mut digest, &level.size);
        }
        for level in self.bids.iter().rev().take(depth) {
            push_checksum_field(&mut digest, &level.price);
            push_checksum_field(&mut digest, &level.size);
        }
        crc32fast::hash(digest.as_bytes())
    }
}

#[derive(Clone, Copy)]
enum SideOrder {
    /// Asks: sorted high→low, best (lowest) at the tail
    Descending,
    /// Bids: sorted low→high, best (highest) at the tail
    Ascending,
}

fn find_index(levels: &[BookLevel], order: SideOrder, key: Decimal) -> Result<usize, usize> {
    match order {
        SideOrder::Descending => levels.binary_search_by(|lvl| lvl.key.cmp(&key).reverse()),
        SideOrder::Ascending => levels.binary_search_by(|lvl| lvl.key.cmp(&key)),
    }
}

fn apply_point(levels: &mut Vec<BookLevel>, order: SideOrder, key: Decimal, point: BookLevel) {
    let remove = parse_size_is_zero(&point.size);
    match find_index(levels, order, key) {
        Ok(idx) => {
            if remove {
                levels.remove(idx);
            } else {
                levels[idx] = point;
            }
        }
        Err(idx) => {
            if !remove {
                levels.insert(idx, point);
            }
        }
    }
}

fn parse_points(points: &[Level2Point]) -> Result<Vec<(Decimal, BookLevel)>, BookError> {
    points
        .iter()
        .map(|p| {
            let level = BookLevel::from_point(p)?;
            // Validate the size too so a bad diff rejects before mutation.
            parse_decimal(&p.size)?;
            Ok((level.key, level))
        })
        .collect()
}

fn parse_decimal(raw: &str) -> Result<Decimal, BookError> {
    Decimal::from_str(raw).map_err(|_| BookError::InvalidDecimal(raw.to_string()))
}

fn parse_size_is_zero(raw: &str) -> bool {
    Decimal::from_str(raw).map(|d| d.is_zero()).unwrap_or(false)
}

fn push_checksum_field(digest: &mut String, raw: &str) {
    let stripped: String = raw.chars().filter(|c| *c != '.').collect();
    digest.push_str(stripped.trim_start_matches('0'));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(asks: &[(&str, &str)], bids: &[(&str, &str)]) -> Level2Snapshot {
        Level2Snapshot {
            exchange: "kraken".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            sequence_id: Some(100),
            timestamp_ms: Some(1_700_000_000_000),
            asks: asks.iter().map(|(p, s)| Level2Point::new(*p, *s)).collect(),
            bids: bids.iter().map(|(p, s)| Level2Point::new(*p, *s)).collect(),
        }
    }

    fn diff(seq: u64, asks: &[(&str, &str)], bids: &[(&str, &str)]) -> Level2Update {
        Level2Update {
            exchange: "kraken".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            sequence_id: Some(seq),
            first_sequence_id: None,
            timestamp_ms: None,
            asks: asks.iter().map(|(p, s)| Level2Point::new(*p, *s)).collect(),
            bids: bids.iter().map(|(p, s)| Level2Point::new(*p, *s)).collect(),
            checksum: None,
        }
    }

    #[test]
    fn test_best_levels_sit_at_the_tail() {
        let book = Level2Book::from_snapshot(&snap(
            &[("100.2", "1"), ("100.1", "2"), ("100.3", "3")],
            &[("99.8", "1"), ("99.9", "2"), ("99.7", "3")],
        ))
        .unwrap();

        assert_eq!(book.best_ask().unwrap().price, "100.1");
        assert_eq!(book.best_bid().unwrap().price, "99.9");
    }

    #[test]
    fn test_zero_size_removes_level() {
        let mut book = Level2Book::from_snapshot(&snap(
            &[("100.1", "2"), ("100.2", "1")],
            &[("99.9", "2")],
        ))
        .unwrap();

        book.update(&diff(101, &[("100.1", "0.00000000")], &[])).unwrap();
        assert_eq!(book.best_ask().unwrap().price, "100.2");
        assert_eq!(book.depth(), (1, 1));
    }

    #[test]
    fn test_unknown_price_inserts_in_order() {
        let mut book = Level2Book::from_snapshot(&snap(
            &[("100.1", "2"), ("100.3", "1")],
            &[("99.9", "2")],
        ))
        .unwrap();

        book.update(&diff(101, &[("100.2", "5")], &[("99.5", "4")])).unwrap();

        let rendered = book.snapshot(10);
        let ask_prices: Vec<&str> = rendered.asks.iter().map(|p| p.price.as_str()).collect();
        let bid_prices: Vec<&str> = rendered.bids.iter().map(|p| p.price.as_str()).collect();
        assert_eq!(ask_prices, vec!["100.1", "100.2", "100.3"]);
        assert_eq!(bid_prices, vec!["99.9", "99.5"]);
    }

    #[test]
    fn test_update_replaces_size_in_place() {
        let mut book =
            Level2Book::from_snapshot(&snap(&[("100.1", "2")], &[("99.9", "2")])).unwrap();
        book.update(&diff(101, &[], &[("99.9", "7.5")])).unwrap();
        assert_eq!(book.best_bid().unwrap().size, "7.5");
        assert_eq!(book.depth(), (1, 1));
    }

    #[test]
    fn test_incremental_equals_batch_application() {
        let snapshot = snap(
            &[("100.1", "2"), ("100.2", "1"), ("100.3", "4")],
            &[("99.9", "2"), ("99.8", "1")],
        );
        let diffs = [
            diff(101, &[("100.2", "0")], &[("99.95", "3")]),
            diff(102, &[("100.15", "6")], &[("99.8", "0")]),
            diff(103, &[("100.1", "1.5")], &[("99.7", "2")]),
        ];

        let mut incremental = Level2Book::from_snapshot(&snapshot).unwrap();
        for d in &diffs {
            incremental.apply_sequenced(d).unwrap();
        }

        let mut batch = Level2Book::from_snapshot(&snapshot).unwrap();
        let combined = Level2Update {
            asks: diffs.iter().flat_map(|d| d.asks.clone()).collect(),
            bids: diffs.iter().flat_map(|d| d.bids.clone()).collect(),
            ..diffs[2].clone()
        };
        batch.update(&combined).unwrap();

        assert_eq!(incremental.snapshot(100), batch.snapshot(100));
        assert_eq!(incremental.checksum(10), batch.checksum(10));
    }

    #[test]
    fn test_sequence_gap_leaves_book_untouched() {
        let mut book =
            Level2Book::from_snapshot(&snap(&[("100.1", "2")], &[("99.9", "2")])).unwrap();
        let before = book.snapshot(10);

        let err = book.apply_sequenced(&diff(105, &[("100.5", "9")], &[])).unwrap_err();
        assert_eq!(err, BookError::SequenceGap { expected: 101, got: 105 });
        assert_eq!(book.snapshot(10), before);

        let err = book.apply_sequenced(&diff(100, &[("100.5", "9")], &[])).unwrap_err();
        assert_eq!(err, BookError::StaleUpdate { last: 100, got: 100 });
        assert_eq!(book.snapshot(10), before);
    }

    #[test]
    fn test_checksum_crc32_check_value() {
        // Fields strip to "12" "345" "6" "789": ask "1.2"/"3.45", then
        // bid "0.06" (leading zeros dropped) / "7.89". The concatenation
        // is "123456789", whose CRC32 is the classic check value.
        let book = Level2Book::from_snapshot(&Level2Snapshot {
            exchange: "kraken".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            sequence_id: None,
            timestamp_ms: None,
            asks: vec![Level2Point::new("1.2", "3.45")],
            bids: vec![Level2Point::new("0.06", "7.89")],
        })
        .unwrap();
        assert_eq!(book.checksum(10), 0xCBF4_3926);
    }

    #[test]
    fn test_checksum_detects_divergence() {
        let snapshot = snap(&[("100.1", "2")], &[("99.9", "2")]);
        let mut a = Level2Book::from_snapshot(&snapshot).unwrap();
        let b = Level2Book::from_snapshot(&snapshot).unwrap();
        assert_eq!(a.checksum(10), b.checksum(10));

        a.update(&diff(101, &[("100.1", "3")], &[])).unwrap();
        assert_ne!(a.checksum(10), b.checksum(10));
    }

    #[test]
    fn test_invalid_decimal_rejected() {
        let mut book =
            Level2Book::from_snapshot(&snap(&[("100.1", "2")], &[("99.9", "2")])).unwrap();
        let err = book.update(&diff(101, &[("not-a-price", "1")], &[])).unwrap_err();
        assert_eq!(err, BookError::InvalidDecimal("not-a-price".into()));
        assert_eq!(book.depth(), (1, 1));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_price() -> impl Strategy<Value = String> {
        (1u32..100_000u32, 1u32..100u32).prop_map(|(a, b)| format!("{a}.{b:02}"))
    }

    fn arb_size() -> impl Strategy<Value = String> {
        (0u32..10_000u32).prop_map(|s| format!("{}.{:04}", s / 100, s % 100))
    }

    proptest! {
        #[test]
        fn asks_stay_sorted_descending(
            points in proptest::collection::vec((arb_price(), arb_size()), 0..40)
        ) {
            let mut book = Level2Book::from_snapshot(&Level2Snapshot {
                exchange: "x".into(),
                base: "B".into(),
                quote: "Q".into(),
                sequence_id: None,
                timestamp_ms: None,
                asks: vec![],
                bids: vec![],
            }).unwrap();

            for (price, size) in &points {
                let diff = Level2Update {
                    exchange: "x".into(),
                    base: "B".into(),
                    quote: "Q".into(),
                    sequence_id: None,
                    first_sequence_id: None,
                    timestamp_ms: None,
                    asks: vec![Level2Point::new(price.clone(), size.clone())],
                    bids: vec![],
                    checksum: None,
                };
                book.update(&diff).unwrap();
            }

            let rendered = book.snapshot(1000);
            // Best-first render of the ask side is ascending by price.
            let parsed: Vec<rust_decimal::Decimal> = rendered
                .asks
                .iter()
                .map(|p| std::str::FromStr::from_str(&p.price).unwrap())
                .collect();
            let mut sorted = parsed.clone();
            sorted.sort();
            prop_assert_eq!(parsed, sorted);
        }

        #[test]
        fn no_zero_size_level_survives(
            points in proptest::collection::vec((arb_price(), arb_size()), 0..40)
        ) {
            let mut book = Level2Book::from_snapshot(&Level2Snapshot {
                exchange: "x".into(),
                base: "B".into(),
                quote: "Q".into(),
                sequence_id: None,
                timestamp_ms: None,
                asks: vec![],
                bids: vec![],
            }).unwrap();

            for (price, size) in &points {
                let diff = Level2Update {
                    exchange: "x".into(),
                    base: "B".into(),
                    quote: "Q".into(),
                    sequence_id: None,
                    first_sequence_id: None,
                    timestamp_ms: None,
                    asks: vec![],
                    bids: vec![Level2Point::new(price.clone(), size.clone())],
                    checksum: None,
                };
                book.update(&diff).unwrap();
            }

            for point in book.snapshot(1000).bids {
                let size: rust_decimal::Decimal =
                    std::str::FromStr::from_str(&point.size).unwrap();
                prop_assert!(!size.is_zero());
            }
        }
    }
}
