//! Order-indexed level-3 book

use crate::error::BookError;
use common::{L3Action, Level2Point, Level2Snapshot, Level3Point, Level3Snapshot, Level3Update};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::str::FromStr;
use tracing::trace;

/// One resting order held by [`Level3Book`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level3Order {
    /// Exchange-native order id
    pub order_id: String,
    /// Price of the order, as the venue sent it
    pub price: String,
    /// Current resting size
    pub size: String,
    /// Time the order was last touched, milliseconds since the epoch
    pub timestamp_ms: Option<u64>,
}

impl Level3Order {
    fn from_point(point: &Level3Point) -> Self {
        Self {
            order_id: point.order_id.clone(),
            price: point.price.clone(),
            size: point.size.clone(),
            timestamp_ms: point.timestamp_ms,
        }
    }
}

/// Order-granular book keyed by exchange order id.
///
/// Diffs carry an action instead of a price/size delta, so every apply is
/// an O(1) map operation regardless of depth: `Open` inserts, `Done`
/// removes, `Change` replaces the resting size, `Match` subtracts the
/// executed size (removing the order when nothing rests). Producing a
/// price-aggregated view costs an O(n log n) pass and is only done on
/// demand via [`aggregate`](Self::aggregate).
#[derive(Clone, Debug, Default)]
pub struct Level3Book {
    exchange: String,
    base: String,
    quote: String,
    asks: FxHashMap<String, Level3Order>,
    bids: FxHashMap<String, Level3Order>,
    sequence_id: Option<u64>,
    timestamp_ms: Option<u64>,
}

impl Level3Book {
    /// Build a book from a full order-granular snapshot.
    pub fn from_snapshot(snapshot: &Level3Snapshot) -> Result<Self, BookError> {
        let mut book = Self {
            exchange: snapshot.exchange.clone(),
            base: snapshot.base.clone(),
            quote: snapshot.quote.clone(),
            asks: FxHashMap::default(),
            bids: FxHashMap::default(),
            sequence_id: snapshot.sequence_id,
            timestamp_ms: snapshot.timestamp_ms,
        };
        for point in &snapshot.asks {
            parse_decimal(&point.price)?;
            book.asks
                .insert(point.order_id.clone(), Level3Order::from_point(point));
        }
        for point in &snapshot.bids {
            parse_decimal(&point.price)?;
            book.bids
                .insert(point.order_id.clone(), Level3Order::from_point(point));
        }
        Ok(book)
    }

    /// Sequence id of the last applied snapshot or diff.
    #[must_use]
    pub fn sequence_id(&self) -> Option<u64> {
        self.sequence_id
    }

    /// Number of resting orders as `(asks, bids)`.
    #[must_use]
    pub fn order_count(&self) -> (usize, usize) {
        (self.asks.len(), self.bids.len())
    }

    /// Look up a resting order on either side.
    #[must_use]
    pub fn order(&self, order_id: &str) -> Option<&Level3Order> {
        self.asks.get(order_id).or_else(|| self.bids.get(order_id))
    }

    /// Apply an order-granular diff without sequence enforcement.
    pub fn update(&mut self, diff: &Level3Update) -> Result<(), BookError> {
        for point in &diff.asks {
            apply_point(&mut self.asks, point)?;
        }
        for point in &diff.bids {
            apply_point(&mut self.bids, point)?;
        }
        if diff.sequence_id.is_some() {
            self.sequence_id = diff.sequence_id;
        }
        if diff.timestamp_ms.is_some() {
            self.timestamp_ms = diff.timestamp_ms;
        }
        Ok(())
    }

    /// Apply a diff, requiring the immediate successor sequence id.
    ///
    /// Same policy as the level-2 book: the book reports a gap or stale
    /// diff and stays untouched; resyncing is the caller's job.
    pub fn apply_sequenced(&mut self, diff: &Level3Update) -> Result<(), BookError> {
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

    /// Aggregate resting orders into a price-level snapshot.
    ///
    /// Sums sizes per price, counts orders per level, sorts, and renders
    /// the best `depth` levels per side best-first.
    pub fn aggregate(&self, depth: usize) -> Result<Level2Snapshot, BookError> {
        Ok(Level2Snapshot {
            exchange: self.exchange.clone(),
            base: self.base.clone(),
            quote: self.quote.clone(),
            sequence_id: self.sequence_id,
            timestamp_ms: self.timestamp_ms,
            asks: aggregate_side(&self.asks, depth, false)?,
            bids: aggregate_side(&self.bids, depth, true)?,
        })
    }
}

fn apply_point(
    side: &mut FxHashMap<String, Level3Order>,
    point: &Level3Point,
) -> Result<(), BookError> {
    match point.action {
        None | Some(L3Action::Open) => {
            parse_decimal(&point.price)?;
            parse_decimal(&point.size)?;
            side.insert(point.order_id.clone(), Level3Order::from_point(point));
        }
        Some(L3Action::Done) => {
            if side.remove(&point.order_id).is_none() {
                // Late done for an order we never held (or already gone).
                trace!(order_id = %point.order_id, "done for unknown order");
            }
        }
        Some(L3Action::Change) => match side.get_mut(&point.order_id) {
            Some(order) => {
                parse_decimal(&point.size)?;
                order.size = point.size.clone();
                order.timestamp_ms = point.timestamp_ms.or(order.timestamp_ms);
            }
            None => {
                // A change can race ahead of the open on some venues;
                // treat it as an upsert.
                parse_decimal(&point.price)?;
                parse_decimal(&point.size)?;
                side.insert(point.order_id.clone(), Level3Order::from_point(point));
            }
        },
        Some(L3Action::Match) => {
            let remove = if let Some(order) = side.get_mut(&point.order_id) {
                let resting = parse_decimal(&order.size)?;
                let matched = parse_decimal(&point.size)?;
                let remaining = resting - matched;
                if remaining > Decimal::ZERO {
                    order.size = remaining.normalize().to_string();
                    order.timestamp_ms = point.timestamp_ms.or(order.timestamp_ms);
                    false
                } else {
                    true
                }
            } else {
                trace!(order_id = %point.order_id, "match for unknown order");
                false
            };
            if remove {
                side.remove(&point.order_id);
            }
        }
    }
    Ok(())
}

fn aggregate_side(
    side: &FxHashMap<String, Level3Order>,
    depth: usize,
    descending: bool,
) -> Result<Vec<Level2Point>, BookError> {
    let mut levels: FxHashMap<Decimal, (Decimal, u64)> = FxHashMap::default();
    for order in side.values() {
        let price = parse_decimal(&order.price)?;
        let size = parse_decimal(&order.size)?;
        let entry = levels.entry(price).or_insert((Decimal::ZERO, 0));
        entry.0 += size;
        entry.1 += 1;
    }

    let mut sorted: Vec<(Decimal, (Decimal, u64))> = levels.into_iter().collect();
    if descending {
        sorted.sort_by(|a, b| b.0.cmp(&a.0));
    } else {
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
    }

    Ok(sorted
        .into_iter()
        .take(depth)
        .map(|(price, (size, count))| Level2Point {
            price: price.normalize().to_string(),
            size: size.normalize().to_string(),
            count: Some(count),
        })
        .collect())
}

fn parse_decimal(raw: &str) -> Result<Decimal, BookError> {
    Decimal::from_str(raw).map_err(|_| BookError::InvalidDecimal(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Level3Snapshot {
        Level3Snapshot {
            exchange: "coinbase".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            sequence_id: Some(50),
            timestamp_ms: Some(1_700_000_000_000),
            asks: vec![
                Level3Point::resting("a1", "100.10", "1.0"),
                Level3Point::resting("a2", "100.10", "0.5"),
                Level3Point::resting("a3", "100.20", "2.0"),
            ],
            bids: vec![
                Level3Point::resting("b1", "99.90", "3.0"),
                Level3Point::resting("b2", "99.80", "1.5"),
            ],
        }
    }

    fn diff(seq: u64, asks: Vec<Level3Point>, bids: Vec<Level3Point>) -> Level3Update {
        Level3Update {
            exchange: "coinbase".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            sequence_id: Some(seq),
            timestamp_ms: None,
            asks,
            bids,
        }
    }

    #[test]
    fn test_open_and_done() {
        let mut book = Level3Book::from_snapshot(&snapshot()).unwrap();
        assert_eq!(book.order_count(), (3, 2));

        book.update(&diff(
            51,
            vec![Level3Point::with_action("a4", "100.30", "4.0", L3Action::Open)],
            vec![Level3Point::with_action("b1", "99.90", "0", L3Action::Done)],
        ))
        .unwrap();

        assert_eq!(book.order_count(), (4, 1));
        assert!(book.order("b1").is_none());
        assert_eq!(book.order("a4").unwrap().size, "4.0");
    }

    #[test]
    fn test_change_replaces_size() {
        let mut book = Level3Book::from_snapshot(&snapshot()).unwrap();
        book.update(&diff(
            51,
            vec![Level3Point::with_action("a1", "100.10", "0.25", L3Action::Change)],
            vec![],
        ))
        .unwrap();
        assert_eq!(book.order("a1").unwrap().size, "0.25");
    }

    #[test]
    fn test_match_subtracts_and_removes_when_exhausted() {
        let mut book = Level3Book::from_snapshot(&snapshot()).unwrap();

        book.update(&diff(
            51,
            vec![Level3Point::with_action("a1", "100.10", "0.4", L3Action::Match)],
            vec![],
        ))
        .unwrap();
        assert_eq!(book.order("a1").unwrap().size, "0.6");

        book.update(&diff(
            52,
            vec![Level3Point::with_action("a1", "100.10", "0.6", L3Action::Match)],
            vec![],
        ))
        .unwrap();
        assert!(book.order("a1").is_none());
    }

    #[test]
    fn test_unknown_done_is_tolerated() {
        let mut book = Level3Book::from_snapshot(&snapshot()).unwrap();
        book.update(&diff(
            51,
            vec![Level3Point::with_action("ghost", "1", "1", L3Action::Done)],
            vec![],
        ))
        .unwrap();
        assert_eq!(book.order_count(), (3, 2));
    }

    #[test]
    fn test_aggregate_sums_per_price_level() {
        let book = Level3Book::from_snapshot(&snapshot()).unwrap();
        let agg = book.aggregate(10).unwrap();

        // a1 + a2 share 100.10: 1.0 + 0.5 = 1.5 across 2 orders.
        assert_eq!(agg.asks[0].price, "100.1");
        assert_eq!(agg.asks[0].size, "1.5");
        assert_eq!(agg.asks[0].count, Some(2));
        assert_eq!(agg.asks[1].price, "100.2");

        // Bids render best (highest) first.
        assert_eq!(agg.bids[0].price, "99.9");
        assert_eq!(agg.bids[1].price, "99.8");
    }

    #[test]
    fn test_aggregate_depth_truncates() {
        let book = Level3Book::from_snapshot(&snapshot()).unwrap();
        let agg = book.aggregate(1).unwrap();
        assert_eq!(agg.asks.len(), 1);
        assert_eq!(agg.bids.len(), 1);
    }

    #[test]
    fn test_sequence_enforcement() {
        let mut book = Level3Book::from_snapshot(&snapshot()).unwrap();

        let err = book
            .apply_sequenced(&diff(53, vec![], vec![]))
            .unwrap_err();
        assert_eq!(err, BookError::SequenceGap { expected: 51, got: 53 });

        let err = book
            .apply_sequenced(&diff(50, vec![], vec![]))
            .unwrap_err();
        assert_eq!(err, BookError::StaleUpdate { last: 50, got: 50 });

        book.apply_sequenced(&diff(51, vec![], vec![])).unwrap();
        assert_eq!(book.sequence_id(), Some(51));
    }
}
