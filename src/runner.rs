//! Drives one invocation: list to a manifest, mirror a tree or fetch a single file.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{RemoteTarget, RunMode, SyncConfig, SyncSource};
use crate::error::{Result, SyncError};
use crate::models::{DateWindow, Manifest};
use crate::services::sync_planner::{SyncPlanner, SyncReport};
use crate::services::webdav::{CrawlReport, TreeCrawler, WebDAVService};

#[derive(Debug)]
pub enum RunOutcome {
    Listed { manifest: PathBuf, total: usize },
    Synced(SyncReport),
}

pub async fn run(config: &SyncConfig) -> Result<RunOutcome> {
    let service = WebDAVService::from_config(config)?;

    match &config.mode {
        RunMode::List { remote, output } => {
            let crawl = crawl(&service, remote, config).await?;
            let manifest = Manifest::from_crawl(remote.root_path.clone(), crawl.resources);
            manifest.save(output).await?;
            Ok(RunOutcome::Listed {
                manifest: output.clone(),
                total: manifest.total,
            })
        }
        RunMode::Get { source, local_root } => {
            let (root_path, resources) = match source {
                SyncSource::Live(remote) => {
                    let crawl = crawl(&service, remote, config).await?;
                    (remote.root_path.clone(), crawl.resources)
                }
                SyncSource::Manifest(path) => {
                    let manifest = Manifest::load(path).await?;
                    info!("📄 Mirroring {} files listed in {}", manifest.total, path.display());
                    (manifest.root_path, manifest.resources)
                }
            };

            let planner = SyncPlanner::new(local_root.clone(), &root_path, config.window);
            let report = planner.run(&resources, &service, config.failure_policy).await?;
            finish(report)
        }
        RunMode::SingleFile { remote, local_root } => {
            let resource = service.stat(&remote.url, &remote.host_prefix).await?;
            info!("📄 {} is {} bytes, modified {}", resource.path, resource.size, resource.modified);

            let planner = SyncPlanner::new(local_root.clone(), parent_path(&remote.root_path), DateWindow::unbounded());
            let report = planner.run(&[resource], &service, config.failure_policy).await?;
            finish(report)
        }
    }
}

async fn crawl(service: &WebDAVService, remote: &RemoteTarget, config: &SyncConfig) -> Result<CrawlReport> {
    let crawler = TreeCrawler::new(service, remote.host_prefix.clone(), config.window)
        .with_max_depth(config.max_depth);
    let report = crawler.crawl(&remote.crawl_url()).await?;

    if !report.skipped_entries.is_empty() {
        warn!("⚠️ {} entries were listed with a non-success status and skipped", report.skipped_entries.len());
    }
    Ok(report)
}

fn finish(report: SyncReport) -> Result<RunOutcome> {
    if report.failures.is_empty() {
        Ok(RunOutcome::Synced(report))
    } else {
        Err(SyncError::IncompleteSync {
            failed: report.failures.len(),
            attempted: report.attempted(),
        })
    }
}

/// URL path of the folder containing the file at `path`
fn parent_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}
