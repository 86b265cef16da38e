//! Subscription commands - list, (de)activate, stats

use anyhow::{Context, Result};
use feedloom_domain::{StoreStats, Subscription};
use std::path::PathBuf;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::args::{IdArgs, ListArgs, OutputArgs};
use crate::context::AppContext;

const UPDATED_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

pub async fn list(
    args: ListArgs,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path, data_dir).await?;
    let subscriptions = ctx
        .manager()
        .list(!args.all)
        .await
        .context("Failed to list subscriptions")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&subscriptions)?);
        return Ok(());
    }

    if subscriptions.is_empty() {
        println!("No subscriptions. Add one with: feedloom add <URL>");
        return Ok(());
    }

    for subscription in &subscriptions {
        print_subscription(subscription);
    }
    println!();
    println!("{} subscriptions", subscriptions.len());

    Ok(())
}

pub async fn set_active(
    args: IdArgs,
    active: bool,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path, data_dir).await?;
    let subscription = ctx.manager().set_active(args.id, active).await?;

    let verb = if active { "Activated" } else { "Deactivated" };
    println!("{} #{} {}", verb, subscription.id, subscription.title);

    Ok(())
}

pub async fn stats(
    args: OutputArgs,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path, data_dir).await?;
    let stats = ctx
        .manager()
        .stats()
        .await
        .context("Failed to read statistics")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }

    Ok(())
}

fn print_subscription(subscription: &Subscription) {
    let state = if subscription.active { "" } else { " (inactive)" };
    let updated = subscription
        .last_updated
        .and_then(|t| t.format(UPDATED_FORMAT).ok())
        .unwrap_or_else(|| "never".to_string());

    println!(
        "#{:<4} {:<12} {}{}",
        subscription.id,
        subscription.platform.as_str(),
        subscription.title,
        state
    );
    println!("      {}  updated: {}", subscription.url, updated);
}

fn print_stats(stats: &StoreStats) {
    println!(
        "Subscriptions: {} ({} active)",
        stats.subscriptions, stats.active_subscriptions
    );
    println!("Items: {}", stats.items);

    if !stats.by_category.is_empty() {
        println!();
        println!("By category:");
        for (category, count) in &stats.by_category {
            println!("  {:<16} {}", category, count);
        }
    }

    if !stats.by_platform.is_empty() {
        println!();
        println!("By platform:");
        for (platform, count) in &stats.by_platform {
            println!("  {:<16} {}", platform.display_name(), count);
        }
    }
}
