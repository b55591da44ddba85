//! Aggregate statistics derived from stored migration events.
//!
//! Everything here is a pure function of the event set: snapshots have no
//! lifecycle of their own and can always be recomputed. Amounts are summed
//! in `U256`, never in floating point.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_primitives::U256;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{MigrationEvent, SourceChain};
use crate::units::{format_units, scale};

/// Percentiles reported in every snapshot.
pub const PERCENTILES: [u8; 7] = [10, 25, 50, 75, 90, 95, 99];

/// Decimals assumed when a snapshot is computed over an empty event set.
const DEFAULT_DECIMALS: u8 = 18;

/// Nearest-rank percentile over an ascending slice: `sorted[floor(N·p/100)]`,
/// clamped to the last element. No interpolation between ranks.
pub fn nearest_rank(sorted: &[U256], p: u8) -> Option<U256> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// `part / whole` in basis points (1/100 of a percent).
fn basis_points(part: U256, whole: U256) -> u32 {
    if whole.is_zero() {
        return 0;
    }
    let bps = part.saturating_mul(U256::from(10_000u64)) / whole;
    bps.saturating_to::<u32>()
}

// ─── AggregateSnapshot ───────────────────────────────────────────────────────

/// Count and volume attributed to one source tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceShare {
    pub source: SourceChain,
    pub count: u64,
    pub total_amount: U256,
    /// Share of all events, in basis points.
    pub count_bps: u32,
    /// Share of the total amount, in basis points.
    pub amount_bps: u32,
}

/// Summary statistics over the stored migration events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub total_events: u64,
    /// Distinct senders.
    pub unique_addresses: u64,
    pub decimals: u8,
    pub total_amount: U256,
    /// Floor of `total_amount / total_events`.
    pub average_amount: U256,
    pub median_amount: U256,
    /// Percentile → amount (raw units), nearest-rank.
    pub percentiles: BTreeMap<u8, U256>,
    /// Largest events by amount, descending.
    pub top: Vec<MigrationEvent>,
    /// One entry per source tag, in `SourceChain::ALL` order.
    pub sources: Vec<SourceShare>,
}

impl AggregateSnapshot {
    /// Compute a snapshot over `events`, keeping the `top_n` largest.
    ///
    /// All events are assumed to belong to one token (same decimals).
    pub fn from_events(events: &[MigrationEvent], top_n: usize) -> Self {
        let decimals = events.first().map(|e| e.decimals).unwrap_or(DEFAULT_DECIMALS);

        let mut amounts: Vec<U256> = events.iter().map(|e| e.amount_raw).collect();
        amounts.sort_unstable();

        let total_amount = amounts
            .iter()
            .fold(U256::ZERO, |acc, a| acc.saturating_add(*a));
        let total_events = events.len() as u64;
        let average_amount = if total_events == 0 {
            U256::ZERO
        } else {
            total_amount / U256::from(total_events)
        };

        let percentiles = PERCENTILES
            .iter()
            .filter_map(|p| nearest_rank(&amounts, *p).map(|v| (*p, v)))
            .collect();

        let unique_addresses = events
            .iter()
            .map(|e| e.from_address.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;

        let mut top: Vec<MigrationEvent> = events.to_vec();
        top.sort_by(|a, b| {
            b.amount_raw
                .cmp(&a.amount_raw)
                .then_with(|| a.position().cmp(&b.position()))
        });
        top.truncate(top_n);

        Self {
            total_events,
            unique_addresses,
            decimals,
            total_amount,
            average_amount,
            median_amount: nearest_rank(&amounts, 50).unwrap_or(U256::ZERO),
            percentiles,
            top,
            sources: source_breakdown(events, total_amount),
        }
    }

    /// Render a raw amount with this snapshot's decimals.
    pub fn display(&self, raw: U256) -> String {
        format_units(raw, self.decimals)
    }

    pub fn percentile(&self, p: u8) -> Option<U256> {
        self.percentiles.get(&p).copied()
    }
}

fn source_breakdown(events: &[MigrationEvent], total_amount: U256) -> Vec<SourceShare> {
    let mut by_source: HashMap<SourceChain, (u64, U256)> = HashMap::new();
    for e in events {
        let entry = by_source.entry(e.source_chain).or_insert((0, U256::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(e.amount_raw);
    }
    let total_events = U256::from(events.len() as u64);

    SourceChain::ALL
        .iter()
        .map(|source| {
            let (count, amount) = by_source.get(source).copied().unwrap_or((0, U256::ZERO));
            SourceShare {
                source: *source,
                count,
                total_amount: amount,
                count_bps: basis_points(U256::from(count), total_events),
                amount_bps: basis_points(amount, total_amount),
            }
        })
        .collect()
}

// ─── Daily series ────────────────────────────────────────────────────────────

/// Activity on one UTC day, plus running totals up to and including it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub count: u64,
    pub total_amount: U256,
    pub unique_addresses: u64,
    pub cumulative_count: u64,
    pub cumulative_amount: U256,
}

/// Group events by the UTC date of their block timestamp, ascending.
///
/// Events without a timestamp are left out.
pub fn daily_stats(events: &[MigrationEvent]) -> Vec<DailyStat> {
    let mut days: BTreeMap<NaiveDate, (u64, U256, HashSet<&str>)> = BTreeMap::new();
    for e in events {
        let Some(date) = e
            .block_timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive())
        else {
            continue;
        };
        let day = days.entry(date).or_insert_with(|| (0, U256::ZERO, HashSet::new()));
        day.0 += 1;
        day.1 = day.1.saturating_add(e.amount_raw);
        day.2.insert(e.from_address.as_str());
    }

    let mut cumulative_count = 0u64;
    let mut cumulative_amount = U256::ZERO;
    days.into_iter()
        .map(|(date, (count, total_amount, senders))| {
            cumulative_count += count;
            cumulative_amount = cumulative_amount.saturating_add(total_amount);
            DailyStat {
                date,
                count,
                total_amount,
                unique_addresses: senders.len() as u64,
                cumulative_count,
                cumulative_amount,
            }
        })
        .collect()
}

/// Average daily activity over the last `days` active days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRate {
    /// 0 when fewer than the requested number of days have activity.
    pub period_days: u32,
    pub total_events: u64,
    pub total_amount: U256,
    pub daily_average_events: f64,
    pub daily_average_amount: U256,
}

pub fn migration_rate(daily: &[DailyStat], days: u32) -> MigrationRate {
    if days == 0 || daily.len() < days as usize {
        return MigrationRate {
            period_days: 0,
            total_events: 0,
            total_amount: U256::ZERO,
            daily_average_events: 0.0,
            daily_average_amount: U256::ZERO,
        };
    }
    let recent = &daily[daily.len() - days as usize..];
    let total_events: u64 = recent.iter().map(|d| d.count).sum();
    let total_amount = recent
        .iter()
        .fold(U256::ZERO, |acc, d| acc.saturating_add(d.total_amount));
    MigrationRate {
        period_days: days,
        total_events,
        total_amount,
        daily_average_events: total_events as f64 / days as f64,
        daily_average_amount: total_amount / U256::from(days),
    }
}

// ─── Size distribution ───────────────────────────────────────────────────────

/// Lower bounds (display units) of the size-distribution buckets; the last
/// bucket is open-ended.
pub const SIZE_BUCKETS: [(u64, &str); 9] = [
    (0, "0-100"),
    (100, "100-500"),
    (500, "500-1K"),
    (1_000, "1K-5K"),
    (5_000, "5K-10K"),
    (10_000, "10K-50K"),
    (50_000, "50K-100K"),
    (100_000, "100K-500K"),
    (500_000, "500K+"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub label: String,
    pub lower_bound: u64,
    pub count: u64,
}

/// Histogram of event sizes over [`SIZE_BUCKETS`], compared exactly in raw units.
pub fn size_distribution(events: &[MigrationEvent], decimals: u8) -> Vec<SizeBucket> {
    let unit = scale(decimals).unwrap_or(U256::from(1u64));
    let bounds: Vec<U256> = SIZE_BUCKETS
        .iter()
        .map(|(lower, _)| U256::from(*lower).saturating_mul(unit))
        .collect();

    let mut counts = vec![0u64; SIZE_BUCKETS.len()];
    for e in events {
        // last bucket whose lower bound is <= amount
        let idx = bounds.iter().rposition(|b| *b <= e.amount_raw).unwrap_or(0);
        counts[idx] += 1;
    }

    SIZE_BUCKETS
        .iter()
        .zip(counts)
        .map(|((lower, label), count)| SizeBucket {
            label: label.to_string(),
            lower_bound: *lower,
            count,
        })
        .collect()
}

// ─── Address summary ─────────────────────────────────────────────────────────

/// Everything a sender has migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSummary {
    pub address: String,
    pub count: u64,
    pub total_amount: U256,
    pub events: Vec<MigrationEvent>,
}

impl AddressSummary {
    pub fn new(address: impl Into<String>, events: Vec<MigrationEvent>) -> Self {
        let total_amount = events
            .iter()
            .fold(U256::ZERO, |acc, e| acc.saturating_add(e.amount_raw));
        Self {
            address: address.into(),
            count: events.len() as u64,
            total_amount,
            events,
        }
    }

    pub fn found(&self) -> bool {
        self.count > 0
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(n: u64, from: &str, amount: u64, ts: Option<i64>, source: SourceChain) -> MigrationEvent {
        MigrationEvent {
            tx_hash: format!("0x{n:064x}"),
            log_index: 0,
            from_address: from.to_string(),
            to_address: "0x99fe40e501151e92f10ac13ea1c06083ee170363".into(),
            amount_raw: U256::from(amount),
            decimals: 0,
            block_number: n,
            block_timestamp: ts,
            source_chain: source,
        }
    }

    fn amounts(values: &[u64]) -> Vec<MigrationEvent> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ev(i as u64, "0xaa", *v, None, SourceChain::Sonic))
            .collect()
    }

    #[test]
    fn nearest_rank_percentiles() {
        let snap = AggregateSnapshot::from_events(&amounts(&[10, 20, 30, 40, 50]), 3);
        assert_eq!(snap.percentile(50), Some(U256::from(30u64)));
        assert_eq!(snap.percentile(90), Some(U256::from(50u64)));
        assert_eq!(snap.percentile(10), Some(U256::from(10u64)));
        assert_eq!(snap.median_amount, U256::from(30u64));
    }

    #[test]
    fn percentile_index_is_clamped() {
        let sorted = vec![U256::from(1u64), U256::from(2u64)];
        assert_eq!(nearest_rank(&sorted, 100), Some(U256::from(2u64)));
        assert_eq!(nearest_rank(&[], 50), None);
    }

    #[test]
    fn totals_and_average_are_exact() {
        let snap = AggregateSnapshot::from_events(&amounts(&[50, 10, 40, 20, 30]), 2);
        assert_eq!(snap.total_events, 5);
        assert_eq!(snap.total_amount, U256::from(150u64));
        assert_eq!(snap.average_amount, U256::from(30u64));
        assert_eq!(snap.top.len(), 2);
        assert_eq!(snap.top[0].amount_raw, U256::from(50u64));
        assert_eq!(snap.top[1].amount_raw, U256::from(40u64));
    }

    #[test]
    fn sums_do_not_lose_precision() {
        let big = U256::from(10u64).pow(U256::from(30u64)) + U256::from(1u64);
        let mut events = amounts(&[0, 0]);
        events[0].amount_raw = big;
        events[1].amount_raw = big;
        let snap = AggregateSnapshot::from_events(&events, 1);
        assert_eq!(snap.total_amount, big * U256::from(2u64));
    }

    #[test]
    fn empty_snapshot() {
        let snap = AggregateSnapshot::from_events(&[], 10);
        assert_eq!(snap.total_events, 0);
        assert_eq!(snap.average_amount, U256::ZERO);
        assert!(snap.percentiles.is_empty());
        assert_eq!(snap.sources.len(), 3);
        assert!(snap.sources.iter().all(|s| s.count == 0 && s.count_bps == 0));
    }

    #[test]
    fn source_breakdown_shares() {
        let events = vec![
            ev(1, "0xa", 300, None, SourceChain::Sonic),
            ev(2, "0xb", 100, None, SourceChain::Ethereum),
            ev(3, "0xa", 0, None, SourceChain::Sonic),
            ev(4, "0xc", 0, None, SourceChain::Unknown),
        ];
        let snap = AggregateSnapshot::from_events(&events, 10);
        assert_eq!(snap.unique_addresses, 3);

        let sonic = &snap.sources[0];
        assert_eq!(sonic.source, SourceChain::Sonic);
        assert_eq!(sonic.count, 2);
        assert_eq!(sonic.count_bps, 5_000);
        assert_eq!(sonic.amount_bps, 7_500);

        let eth = &snap.sources[1];
        assert_eq!(eth.count, 1);
        assert_eq!(eth.amount_bps, 2_500);
    }

    #[test]
    fn daily_series_groups_by_utc_date() {
        // 2024-01-01T00:00:00Z = 1_704_067_200
        let day = 86_400;
        let base = 1_704_067_200;
        let events = vec![
            ev(1, "0xa", 10, Some(base + 10), SourceChain::Sonic),
            ev(2, "0xb", 20, Some(base + 20), SourceChain::Sonic),
            ev(3, "0xa", 5, Some(base + day + 1), SourceChain::Sonic),
            ev(4, "0xa", 99, None, SourceChain::Sonic),
        ];
        let daily = daily_stats(&events);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(daily[0].count, 2);
        assert_eq!(daily[0].unique_addresses, 2);
        assert_eq!(daily[0].total_amount, U256::from(30u64));
        assert_eq!(daily[1].cumulative_count, 3);
        assert_eq!(daily[1].cumulative_amount, U256::from(35u64));
    }

    #[test]
    fn rate_needs_enough_days() {
        let base = 1_704_067_200;
        let events: Vec<_> = (0..3)
            .map(|i| ev(i, "0xa", 10 * (i + 1), Some(base + i as i64 * 86_400), SourceChain::Sonic))
            .collect();
        let daily = daily_stats(&events);

        assert_eq!(migration_rate(&daily, 7).period_days, 0);

        let rate = migration_rate(&daily, 2);
        assert_eq!(rate.period_days, 2);
        assert_eq!(rate.total_events, 2);
        assert_eq!(rate.total_amount, U256::from(50u64));
        assert_eq!(rate.daily_average_amount, U256::from(25u64));
        assert!((rate.daily_average_events - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn size_histogram_bins() {
        let events = amounts(&[5, 100, 499, 750, 1_000_000]);
        let buckets = size_distribution(&events, 0);
        let count = |label: &str| buckets.iter().find(|b| b.label == label).unwrap().count;
        assert_eq!(count("0-100"), 1);
        assert_eq!(count("100-500"), 2);
        assert_eq!(count("500-1K"), 1);
        assert_eq!(count("500K+"), 1);
    }

    #[test]
    fn address_summary_totals() {
        let summary = AddressSummary::new("0xa", amounts(&[1, 2, 3]));
        assert!(summary.found());
        assert_eq!(summary.total_amount, U256::from(6u64));
        assert!(!AddressSummary::new("0xb", vec![]).found());
    }
}
