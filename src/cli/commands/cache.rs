//! Cache command - inspect and maintain persisted results

use crate::cache::{create_driver, CacheItem, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, StorageKind};
use crate::error::{ClientError, ClientResult};
use crate::event::StoreEventBus;
use crate::ui::{self, UiContext};
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ClientResult<()> {
    let mut store = open_store(config).await?;

    match args.action {
        CacheAction::List { format } => list_buckets(&store, config, format),
        CacheAction::Show { bucket, format } => show_bucket(&store, &bucket, format),
        CacheAction::Sweep => sweep(&mut store).await,
        CacheAction::Clear { yes } => clear(&mut store, yes).await,
    }
}

async fn open_store(config: &Config) -> ClientResult<CacheStore> {
    let store = CacheStore::open(
        create_driver(&config.cache),
        config.cache.lifetime(),
        Arc::new(StoreEventBus::new()),
    )
    .await;

    if let Some(reason) = store.failure() {
        return Err(ClientError::storage_unavailable(
            store.driver_name(),
            reason,
        ));
    }

    debug!(driver = store.driver_name(), "Opened cache store");
    Ok(store)
}

#[derive(Debug, Serialize)]
struct BucketSummary {
    name: String,
    items: usize,
    valid: usize,
    newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ItemSummary {
    id: String,
    date: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    valid: bool,
    bytes: usize,
}

fn summarize_bucket(store: &CacheStore, name: &str) -> BucketSummary {
    let items = store.bucket(name).unwrap_or_default();
    let lifetime = store.lifetime();

    BucketSummary {
        name: name.to_string(),
        items: items.len(),
        valid: items.iter().filter(|item| item.is_valid(lifetime)).count(),
        newest: items.iter().map(|item| item.date).max(),
    }
}

fn summarize_item(item: &CacheItem, store: &CacheStore) -> ItemSummary {
    let lifetime = store.lifetime();
    ItemSummary {
        id: item.id.clone(),
        date: item.date,
        expires_at: item.expires_at(lifetime),
        valid: item.is_valid(lifetime),
        bytes: item.result.len(),
    }
}

/// List buckets with item counts
fn list_buckets(store: &CacheStore, config: &Config, format: OutputFormat) -> ClientResult<()> {
    let buckets: Vec<BucketSummary> = store
        .list_buckets()
        .iter()
        .map(|name| summarize_bucket(store, name))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&buckets)?),
        OutputFormat::Plain => {
            for bucket in &buckets {
                println!("{}", bucket.name);
            }
        }
        OutputFormat::Table => {
            if buckets.is_empty() {
                println!("No cache buckets found.");
                if config.cache.storage != StorageKind::Disk {
                    let ctx = UiContext::detect();
                    ui::remark(
                        &ctx,
                        &format!(
                            "{} storage does not outlive the process that wrote it",
                            config.cache.storage
                        ),
                    );
                }
                return Ok(());
            }
            print_bucket_table(&buckets);
        }
    }

    Ok(())
}

fn print_bucket_table(buckets: &[BucketSummary]) {
    println!("{:<32} {:>8} {:>8}  {:<20}", "BUCKET", "ITEMS", "VALID", "NEWEST");
    println!("{}", "-".repeat(72));

    for bucket in buckets {
        let valid = if bucket.valid == bucket.items {
            style(bucket.valid.to_string()).green().to_string()
        } else {
            style(bucket.valid.to_string()).yellow().to_string()
        };
        let newest = bucket
            .newest
            .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<32} {:>8} {:>8}  {:<20}",
            bucket.name, bucket.items, valid, newest
        );
    }

    println!();
    println!("Total: {} bucket(s)", buckets.len());
}

/// Show the items of one bucket
fn show_bucket(store: &CacheStore, bucket: &str, format: OutputFormat) -> ClientResult<()> {
    let items = store
        .bucket(bucket)
        .ok_or_else(|| ClientError::BucketNotFound(bucket.to_string()))?;
    let summaries: Vec<ItemSummary> = items
        .iter()
        .map(|item| summarize_item(item, store))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Plain => {
            for item in &summaries {
                println!("{}", item.id);
            }
        }
        OutputFormat::Table => {
            println!("Bucket: {}", bucket);
            println!();

            if summaries.is_empty() {
                println!("No items cached.");
                return Ok(());
            }

            println!(
                "{:<32} {:<17} {:<17} {:<8} {:>8}",
                "ARGS", "DATE", "EXPIRES", "STATUS", "BYTES"
            );
            println!("{}", "-".repeat(86));
            for item in &summaries {
                let status = if item.valid {
                    style("valid").green().to_string()
                } else {
                    style("expired").dim().to_string()
                };
                println!(
                    "{:<32} {:<17} {:<17} {:<8} {:>8}",
                    item.id,
                    item.date.format("%Y-%m-%d %H:%M"),
                    item.expires_at.format("%Y-%m-%d %H:%M"),
                    status,
                    item.bytes
                );
            }
        }
    }

    Ok(())
}

/// Remove expired items from every bucket
async fn sweep(store: &mut CacheStore) -> ClientResult<()> {
    let ctx = UiContext::detect();
    let removed = store.sweep().await;

    if let Some(reason) = store.failure() {
        return Err(ClientError::storage_unavailable(store.driver_name(), reason));
    }

    if removed == 0 {
        ui::step_ok(&ctx, "No expired items");
    } else {
        ui::step_ok(&ctx, &format!("Removed {} expired item(s)", removed));
    }
    Ok(())
}

/// Remove every bucket after confirmation
async fn clear(store: &mut CacheStore, yes: bool) -> ClientResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let buckets = store.list_buckets();

    if buckets.is_empty() {
        ui::step_ok(&ctx, "Cache is already empty");
        return Ok(());
    }

    let prompt = format!("Remove {} bucket(s)?", buckets.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_warn_hint(&ctx, "Nothing removed", "Pass --yes to skip confirmation");
        return Ok(());
    }

    let removed = store.clear().await;
    if let Some(reason) = store.failure() {
        return Err(ClientError::storage_unavailable(store.driver_name(), reason));
    }

    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} bucket(s)", removed),
        store.driver_name(),
    );
    Ok(())
}
