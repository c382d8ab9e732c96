use std::{any::Any, panic::AssertUnwindSafe};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::{
    domain::{CompanyResult, RunRequest, Summary, Target, Tone},
    services::{extract_summary, resolve_targets, BrowserPage, Pipeline, RunManager},
};

pub const LOAD_FAILURE_REASON: &str = "failed to load website";

#[derive(Serialize)]
struct Trace<'a> {
    url: &'a str,
    summary: &'a Summary,
    timestamp: DateTime<Utc>,
}

/// Drives one run from session acquisition to its terminal state.
///
/// The page and the session are released on every path once they were
/// acquired, and nothing raised inside the run body escapes this function.
pub(crate) async fn execute_run(manager: RunManager, run_id: Uuid, request: RunRequest) {
    let pipeline = manager.pipeline();

    let session = match pipeline.sessions.create_session().await {
        Ok(session) => session,
        Err(e) => {
            manager.fail(run_id, format!("failed to create browser session: {}", e));
            return;
        }
    };
    log::info!("Run {} acquired browser session {}", run_id, session.id);

    let connected = AssertUnwindSafe(pipeline.connector.connect(&session))
        .catch_unwind()
        .await;
    let outcome = match connected {
        Ok(Ok(page)) => {
            let outcome = AssertUnwindSafe(drive(&manager, run_id, &request, page.as_ref()))
                .catch_unwind()
                .await;
            if let Err(e) = page.close().await {
                log::warn!("Failed to close browser page for run {}: {}", run_id, e);
            }
            outcome
        }
        Ok(Err(e)) => Ok(Err(anyhow::Error::new(e).context("failed to open browser page"))),
        Err(panic) => Err(panic),
    };

    match pipeline.sessions.close_session(&session.id).await {
        true => log::info!("Released browser session {}", session.id),
        false => log::warn!("Failed to release browser session {}", session.id),
    }

    match outcome {
        Ok(Ok(())) => manager.complete(run_id),
        Ok(Err(e)) => manager.fail(run_id, format!("{:#}", e)),
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            manager.fail(run_id, format!("run crashed: {}", reason))
        }
    }
}

async fn drive(
    manager: &RunManager,
    run_id: Uuid,
    request: &RunRequest,
    page: &dyn BrowserPage,
) -> anyhow::Result<()> {
    let pipeline = manager.pipeline();

    let targets = match manager.is_shutting_down() {
        true => vec![],
        false => {
            resolve_targets(
                page,
                &request.source,
                &pipeline.directory,
                pipeline.timeouts,
            )
            .await
        }
    };
    log::info!("Run {} resolved {} targets", run_id, targets.len());
    manager.set_total(run_id, targets.len());

    for (i, target) in targets.iter().enumerate() {
        if manager.is_shutting_down() {
            log::warn!(
                "Run {} stopping early at {}/{} for shutdown",
                run_id,
                i,
                targets.len()
            );
            break;
        }

        log::info!(
            "Run {} processing {}/{}: {}",
            run_id,
            i + 1,
            targets.len(),
            target.url
        );
        let processed = AssertUnwindSafe(process_target(
            pipeline,
            run_id,
            page,
            target,
            request.tone,
        ))
        .catch_unwind()
        .await;

        let result = match processed {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("Run {} failed on {}: {:#}", run_id, target.url, e);
                CompanyResult::error(target, format!("{:#}", e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                log::error!("Run {} crashed on {}: {}", run_id, target.url, reason);
                CompanyResult::error(target, reason)
            }
        };
        manager.record_result(run_id, result);
    }

    Ok(())
}

/// Visit, extract, screenshot, roast and trace one target.
async fn process_target(
    pipeline: &Pipeline,
    run_id: Uuid,
    page: &dyn BrowserPage,
    target: &Target,
    tone: Tone,
) -> anyhow::Result<CompanyResult> {
    let timeouts = pipeline.timeouts;

    let loaded = match timeout(timeouts.navigation, page.goto(&target.url)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("Navigation to {} failed: {}", target.url, e);
            false
        }
        Err(_) => {
            log::warn!(
                "Navigation to {} timed out after {:?}",
                target.url,
                timeouts.navigation
            );
            false
        }
    };
    if !loaded {
        return Ok(CompanyResult::skipped(target, LOAD_FAILURE_REASON));
    }
    if !timeouts.settle.is_zero() {
        sleep(timeouts.settle).await;
    }

    let slug = target.slug();
    let summary = extract_summary(page, timeouts.extraction).await;
    let screenshot_url = capture_screenshot(pipeline, run_id, page, &slug).await;
    let roast = pipeline.roaster.generate(&summary, tone).await;

    let trace = serde_json::to_value(Trace {
        url: &target.url,
        summary: &summary,
        timestamp: Utc::now(),
    })
    .context("failed to encode trace")?;
    if let Err(e) = pipeline.storage.put_trace(run_id, &slug, &trace).await {
        log::warn!("Failed to store trace for {}: {}", target.url, e);
    }

    Ok(CompanyResult::done(target, summary, roast, screenshot_url))
}

async fn capture_screenshot(
    pipeline: &Pipeline,
    run_id: Uuid,
    page: &dyn BrowserPage,
    slug: &str,
) -> Option<String> {
    let png = match timeout(pipeline.timeouts.screenshot, page.screenshot()).await {
        Ok(Ok(png)) => png,
        Ok(Err(e)) => {
            log::warn!("Failed to capture screenshot of {}: {}", slug, e);
            return None;
        }
        Err(_) => {
            log::warn!("Screenshot of {} timed out", slug);
            return None;
        }
    };

    match pipeline.storage.put_screenshot(run_id, slug, png).await {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("Failed to store screenshot of {}: {}", slug, e);
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
