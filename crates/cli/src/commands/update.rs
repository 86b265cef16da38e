//! Update command - one run over all active subscriptions

use anyhow::{Context, Result};
use feedloom_domain::{UpdateSummary, usecases::ReportRenderer};
use std::path::PathBuf;

use crate::args::UpdateArgs;
use crate::context::AppContext;

pub async fn execute(
    args: UpdateArgs,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path, data_dir).await?;
    let (orchestrator, classify) = ctx.orchestrator()?;

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Ctrl+C handler unavailable; update cannot be interrupted");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    let summary = match orchestrator
        .run_update_until(classify && !args.no_classify, args.digest, shutdown)
        .await
    {
        Ok(summary) => summary,
        Err(e) if e.is_already_running() => {
            tracing::info!(error = %e, "Skipping update");
            println!("update already running");
            return Ok(());
        }
        Err(e) => return Err(e).context("Update failed"),
    };

    let renderer = ReportRenderer::new(ctx.config.report_config());
    let markdown = if args.digest {
        let previous = ctx.reports.read_snapshot().await;
        let digest = renderer.render_digest(&summary.report_items, &previous, summary.finished_at);
        ctx.reports
            .write_snapshot(&digest.snapshot)
            .await
            .context("Failed to write digest snapshot")?;
        digest.markdown
    } else {
        renderer.render_full(&summary.report_items, summary.finished_at)
    };

    let report_path = ctx
        .reports
        .write_report(&markdown)
        .await
        .context("Failed to write report")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        println!("Report: {}", report_path.display());
    }

    Ok(())
}

fn print_summary(summary: &UpdateSummary) {
    let elapsed = summary.finished_at - summary.started_at;

    println!(
        "Processed {}/{} subscriptions in {:.1}s, {} new items",
        summary.processed,
        summary.total_subscriptions,
        elapsed.as_seconds_f64(),
        summary.new_item_count
    );

    if summary.cancelled {
        println!(
            "Interrupted: {} subscriptions not started",
            summary.skipped
        );
    }

    if !summary.errors.is_empty() {
        println!("{} subscriptions failed:", summary.error_count());
        for failure in &summary.errors {
            let marker = if failure.actionable { " (action needed)" } else { "" };
            println!(
                "  #{} [{}] {}: {}{}",
                failure.subscription_id, failure.platform, failure.url, failure.error, marker
            );
        }
    }
}
