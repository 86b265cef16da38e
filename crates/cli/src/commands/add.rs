//! Add command - subscribe to a URL and fetch it once

use anyhow::{Context, Result};
use feedloom_domain::SubscriptionOutcome;
use std::path::PathBuf;

use crate::args::AddArgs;
use crate::context::AppContext;

pub async fn execute(
    args: AddArgs,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path, data_dir).await?;

    let subscribed = ctx
        .manager()
        .subscribe(&args.url)
        .await
        .with_context(|| format!("Failed to subscribe to {}", args.url))?;
    let subscription = &subscribed.subscription;

    if !subscribed.created {
        println!(
            "Already subscribed: #{} [{}] {}",
            subscription.id, subscription.platform, subscription.title
        );
        return Ok(());
    }

    println!(
        "Subscribed #{} [{}] {} (account {})",
        subscription.id, subscription.platform, subscription.url, subscribed.identifier
    );

    let (orchestrator, classify) = ctx.orchestrator()?;
    let outcome = orchestrator
        .refresh_one(subscription, classify && !args.no_classify)
        .await;

    match outcome {
        SubscriptionOutcome::Fetched { new_items } => {
            println!("Fetched {} items", new_items);
        }
        SubscriptionOutcome::Failed {
            error,
            actionable,
            new_items,
        } => {
            // The subscription stays; the next update retries
            tracing::warn!(
                subscription_id = subscription.id,
                error = %error,
                actionable,
                new_items,
                "Initial fetch failed"
            );
            println!("Initial fetch failed after {} new items: {}", new_items, error);
        }
        SubscriptionOutcome::NotStarted => {}
    }

    Ok(())
}
