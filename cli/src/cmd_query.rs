//! Read-only commands over the store.

use anyhow::{Context, Result};
use serde::Serialize;

use migtrack_core::stats::{migration_rate, size_distribution, AddressSummary, MigrationRate, SizeBucket};
use migtrack_core::types::MigrationEvent;
use migtrack_core::units::{format_units, parse_units};
use migtrack_core::AggregateSnapshot;

use crate::App;

/// One event as printed: amounts in display units.
#[derive(Serialize)]
struct EventRow<'a> {
    tx_hash: &'a str,
    block_number: u64,
    timestamp: Option<String>,
    from: &'a str,
    amount: String,
    source: String,
}

impl<'a> EventRow<'a> {
    fn new(e: &'a MigrationEvent) -> Self {
        Self {
            tx_hash: &e.tx_hash,
            block_number: e.block_number,
            timestamp: e
                .block_timestamp
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|t| t.to_rfc3339()),
            from: &e.from_address,
            amount: e.amount_display(),
            source: e.source_chain.to_string(),
        }
    }
}

fn print_events(events: &[MigrationEvent]) {
    for e in events {
        let row = EventRow::new(e);
        println!(
            "  #{:<10} {:<25} {} {:>28} [{}] {}",
            row.block_number,
            row.timestamp.as_deref().unwrap_or("-"),
            row.from,
            row.amount,
            row.source,
            row.tx_hash,
        );
    }
}

pub async fn status(app: &App) -> Result<()> {
    let store = app.store().await?;
    let cursor = store.cursor().await?;
    let count = store.event_count().await?;
    if app.json {
        return app.print_json(&serde_json::json!({
            "last_synced_block": cursor.last_synced_block,
            "last_sync_time": cursor.last_sync_time,
            "events": count,
        }));
    }
    println!("Last synced block: {}", cursor.last_synced_block);
    match cursor.last_sync_time {
        Some(t) => println!("Last sync:         {}", t.to_rfc3339()),
        None => println!("Last sync:         never"),
    }
    println!("Stored events:     {count}");
    Ok(())
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    total_events: u64,
    unique_addresses: u64,
    total_amount: String,
    average_amount: String,
    median_amount: String,
    percentiles: Vec<(u8, String)>,
    sources: Vec<SourceRow>,
    size_distribution: &'a [SizeBucket],
    rate: &'a MigrationRate,
    top: Vec<EventRow<'a>>,
}

#[derive(Serialize)]
struct SourceRow {
    source: String,
    count: u64,
    amount: String,
    count_pct: String,
    amount_pct: String,
}

fn pct(bps: u32) -> String {
    format!("{}.{:02}", bps / 100, bps % 100)
}

pub async fn stats(app: &App, top: usize, rate_days: u32) -> Result<()> {
    let store = app.store().await?;
    let snapshot: AggregateSnapshot = store.aggregate(top).await.context("computing aggregates")?;
    let events = store.all_events().await?;
    let buckets = size_distribution(&events, app.config.token.decimals);
    let daily = store.daily_stats().await?;
    let rate = migration_rate(&daily, rate_days);

    let output = StatsOutput {
        total_events: snapshot.total_events,
        unique_addresses: snapshot.unique_addresses,
        total_amount: snapshot.display(snapshot.total_amount),
        average_amount: snapshot.display(snapshot.average_amount),
        median_amount: snapshot.display(snapshot.median_amount),
        percentiles: snapshot
            .percentiles
            .iter()
            .map(|(p, v)| (*p, snapshot.display(*v)))
            .collect(),
        sources: snapshot
            .sources
            .iter()
            .map(|s| SourceRow {
                source: s.source.to_string(),
                count: s.count,
                amount: snapshot.display(s.total_amount),
                count_pct: pct(s.count_bps),
                amount_pct: pct(s.amount_bps),
            })
            .collect(),
        size_distribution: &buckets,
        rate: &rate,
        top: snapshot.top.iter().map(EventRow::new).collect(),
    };
    if app.json {
        return app.print_json(&output);
    }

    println!("Migrations:        {}", output.total_events);
    println!("Unique addresses:  {}", output.unique_addresses);
    println!("Total migrated:    {}", output.total_amount);
    println!("Average:           {}", output.average_amount);
    println!("Median:            {}", output.median_amount);
    println!("\nPercentiles:");
    for (p, v) in &output.percentiles {
        println!("  p{p:<3} {v}");
    }
    println!("\nBy source:");
    for s in &output.sources {
        println!(
            "  {:<9} {:>6} ({:>6}%)  {} ({}%)",
            s.source, s.count, s.count_pct, s.amount, s.amount_pct
        );
    }
    println!("\nSize distribution:");
    for b in output.size_distribution {
        println!("  {:<10} {}", b.label, b.count);
    }
    if rate.period_days > 0 {
        println!(
            "\nLast {} active days: {} migrations, {:.1}/day, {} tokens/day",
            rate.period_days,
            rate.total_events,
            rate.daily_average_events,
            format_units(rate.daily_average_amount, app.config.token.decimals),
        );
    }
    if !snapshot.top.is_empty() {
        println!("\nLargest migrations:");
        print_events(&snapshot.top);
    }
    Ok(())
}

pub async fn lookup(app: &App, address: &str) -> Result<()> {
    let store = app.store().await?;
    let events = store.events_by_address(address).await?;
    let summary = AddressSummary::new(address.to_lowercase(), events);
    let decimals = app.config.token.decimals;

    if app.json {
        return app.print_json(&serde_json::json!({
            "address": summary.address,
            "count": summary.count,
            "total_amount": format_units(summary.total_amount, decimals),
            "events": summary.events.iter().map(EventRow::new).collect::<Vec<_>>(),
        }));
    }
    if !summary.found() {
        println!("No migrations from {}", summary.address);
        return Ok(());
    }
    println!(
        "{}: {} migrations, {} tokens",
        summary.address,
        summary.count,
        format_units(summary.total_amount, decimals)
    );
    print_events(&summary.events);
    Ok(())
}

pub async fn large(app: &App, threshold: &str) -> Result<()> {
    let raw = parse_units(threshold, app.config.token.decimals)
        .with_context(|| format!("invalid threshold '{threshold}'"))?;
    let store = app.store().await?;
    let events = store.events_above(raw).await?;
    if app.json {
        return app.print_json(&events.iter().map(EventRow::new).collect::<Vec<_>>());
    }
    println!("{} migrations of at least {threshold} tokens", events.len());
    print_events(&events);
    Ok(())
}

pub async fn timeline(app: &App, limit: usize) -> Result<()> {
    let store = app.store().await?;
    let events = store.timeline(limit).await?;
    if app.json {
        return app.print_json(&events.iter().map(EventRow::new).collect::<Vec<_>>());
    }
    print_events(&events);
    Ok(())
}

pub async fn daily(app: &App, snapshots: bool) -> Result<()> {
    let store = app.store().await?;
    let decimals = app.config.token.decimals;

    if snapshots {
        let snapshots = store.daily_snapshots().await?;
        if app.json {
            return app.print_json(&snapshots);
        }
        for s in &snapshots {
            println!(
                "  {}  {:>7} events  {:>6} addresses  total {}  median {}",
                s.date,
                s.total_events,
                s.unique_addresses,
                format_units(s.total_amount, decimals),
                format_units(s.median_amount, decimals),
            );
        }
        return Ok(());
    }

    let days = store.daily_stats().await?;
    if app.json {
        return app.print_json(&days);
    }
    for d in &days {
        println!(
            "  {}  {:>6} migrations  {:>6} addresses  {:>24}  cumulative {} / {}",
            d.date,
            d.count,
            d.unique_addresses,
            format_units(d.total_amount, decimals),
            d.cumulative_count,
            format_units(d.cumulative_amount, decimals),
        );
    }
    Ok(())
}
