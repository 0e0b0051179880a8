//! Per-file mirroring decisions.
//!
//! For every remote file the planner maps the URL onto the local root, makes
//! sure the parent directory exists and decides whether the file has to be
//! fetched. A local file with exactly the recorded size counts as mirrored;
//! nothing else about it is compared.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Result, SyncError};
use crate::models::{DateWindow, Resource};
use crate::services::webdav::common::decode_path;

/// Writes the content of one remote file to a local path
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn fetch(&self, resource_url: &str, target: &Path) -> Result<u64>;
}

/// What to do when a download fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first failed download
    #[default]
    Abort,
    /// Record the failure and carry on with the remaining files
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Fetch,
    /// Local file already has the recorded size
    UpToDate,
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub resource_url: String,
    pub target: PathBuf,
    pub decision: SyncDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub bytes_fetched: u64,
    pub up_to_date: usize,
    pub outside_window: usize,
    /// Collections handed to the planner, which never mirrors them
    pub not_files: usize,
    /// Files whose path does not lie below the remote root
    pub rejected_paths: usize,
    pub failures: Vec<TransferFailure>,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.fetched + self.failures.len()
    }
}

pub struct SyncPlanner {
    local_root: PathBuf,
    remote_root: String,
    window: DateWindow,
}

impl SyncPlanner {
    pub fn new(local_root: impl Into<PathBuf>, remote_root_path: &str, window: DateWindow) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: decode_path(remote_root_path.trim()).trim_end_matches('/').to_string(),
            window,
        }
    }

    /// Local path mirroring `resource`, or `None` when the resource does not
    /// lie strictly below the remote root or would escape the local root
    pub fn target_path(&self, resource: &Resource) -> Option<PathBuf> {
        let url = Url::parse(&resource.path).ok()?;
        let remote_path = decode_path(url.path());
        let relative = remote_path.strip_prefix(&self.remote_root)?;
        if !relative.starts_with('/') {
            return None;
        }

        let mut target = self.local_root.clone();
        let mut components = 0;
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            if component == "." || component == ".." || component.contains('\\') {
                return None;
            }
            target.push(component);
            components += 1;
        }

        (components > 0).then_some(target)
    }

    /// Decides the fate of one file, creating its parent directory on the way.
    ///
    /// Returns `Ok(None)` for resources that cannot be mapped below the local root.
    pub async fn plan_one(&self, resource: &Resource) -> Result<Option<PlannedTransfer>> {
        let Some(target) = self.target_path(resource) else {
            return Ok(None);
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        let decision = if !self.window.admits(resource) {
            SyncDecision::OutsideWindow
        } else if local_size(&target).await == Some(resource.size) {
            SyncDecision::UpToDate
        } else {
            SyncDecision::Fetch
        };

        Ok(Some(PlannedTransfer {
            resource_url: resource.path.clone(),
            target,
            decision,
        }))
    }

    /// Mirrors every file of `resources`, one at a time
    pub async fn run(
        &self,
        resources: &[Resource],
        fetcher: &dyn ContentFetcher,
        policy: FailurePolicy,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();
        info!(
            "⬇️ Mirroring {} resources from '{}' into {} (window: {})",
            resources.len(),
            self.remote_root,
            self.local_root.display(),
            self.window
        );

        for resource in resources {
            if !resource.is_file() {
                report.not_files += 1;
                continue;
            }
            debug!("Processing: {} ({} bytes, modified {})", resource.path, resource.size, resource.modified);

            let Some(planned) = self.plan_one(resource).await? else {
                warn!("Skipping '{}': not below remote root '{}'", resource.path, self.remote_root);
                report.rejected_paths += 1;
                continue;
            };

            match planned.decision {
                SyncDecision::UpToDate => {
                    debug!("{} is up to date", planned.target.display());
                    report.up_to_date += 1;
                }
                SyncDecision::OutsideWindow => {
                    debug!("{} modified {} is outside {}", resource.path, resource.modified, self.window);
                    report.outside_window += 1;
                }
                SyncDecision::Fetch => match fetcher.fetch(&planned.resource_url, &planned.target).await {
                    Ok(bytes) => {
                        report.fetched += 1;
                        report.bytes_fetched += bytes;
                    }
                    Err(e) if policy == FailurePolicy::Continue => {
                        error!("❌ {}", e);
                        report.failures.push(TransferFailure {
                            url: planned.resource_url,
                            message: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        info!(
            "Mirror finished in {:.2}s: {} fetched ({} bytes), {} up to date, {} outside window, {} rejected, {} failed",
            started.elapsed().as_secs_f64(),
            report.fetched,
            report.bytes_fetched,
            report.up_to_date,
            report.outside_window,
            report.rejected_paths,
            report.failures.len()
        );
        Ok(report)
    }
}

/// Size of the regular file at `path`, if there is one
async fn local_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(metadata.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ROOT: &str = "/remote.php/dav/files/alice/docs";

    fn url(rel: &str) -> String {
        format!("https://cloud.example.com{}/{}", ROOT, rel)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Writes `size` bytes per fetch and records each call
    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<(String, PathBuf)>>,
        fail_on: Option<String>,
    }

    impl RecordingFetcher {
        fn failing_on(url: String) -> Self {
            Self {
                fail_on: Some(url),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentFetcher for RecordingFetcher {
        async fn fetch(&self, resource_url: &str, target: &Path) -> Result<u64> {
            self.calls.lock().unwrap().push((resource_url.to_string(), target.to_path_buf()));
            if self.fail_on.as_deref() == Some(resource_url) {
                return Err(SyncError::Download {
                    url: resource_url.to_string(),
                    status: Some(500),
                    message: "Internal Server Error".to_string(),
                });
            }
            // The size is encoded in the file name for these tests: <name>-<size>.bin
            let size: usize = resource_url
                .rsplit('-')
                .next()
                .and_then(|s| s.strip_suffix(".bin"))
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            std::fs::write(target, vec![b'x'; size]).unwrap();
            Ok(size as u64)
        }
    }

    #[test]
    fn test_target_path_mapping() {
        let planner = SyncPlanner::new("/mirror", &format!("{}/", ROOT), DateWindow::unbounded());

        let nested = Resource::file(url("archive/c.txt"), 1, day(2021, 1, 1));
        assert_eq!(planner.target_path(&nested), Some(PathBuf::from("/mirror/archive/c.txt")));

        let encoded = Resource::file(url("My%20Notes/r%C3%A9sum%C3%A9.txt"), 1, day(2021, 1, 1));
        assert_eq!(planner.target_path(&encoded), Some(PathBuf::from("/mirror/My Notes/résumé.txt")));
    }

    #[test]
    fn test_target_path_rejects_resources_outside_root() {
        let planner = SyncPlanner::new("/mirror", ROOT, DateWindow::unbounded());

        let sibling = Resource::file("https://cloud.example.com/remote.php/dav/files/alice/docs2/a.txt", 1, day(2021, 1, 1));
        assert_eq!(planner.target_path(&sibling), None);

        let escaping = Resource::file(url("sub/..%2F..%2Fetc/passwd"), 1, day(2021, 1, 1));
        assert_eq!(planner.target_path(&escaping), None);

        let root_itself = Resource::file(format!("https://cloud.example.com{}/", ROOT), 1, day(2021, 1, 1));
        assert_eq!(planner.target_path(&root_itself), None);
    }

    #[tokio::test]
    async fn test_matching_size_skips_fetch() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b-700.bin"), vec![0u8; 700]).unwrap();

        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::default();
        let resources = vec![Resource::file(url("b-700.bin"), 700, day(2021, 6, 1))];

        let report = planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap();
        assert!(fetcher.calls().is_empty());
        assert_eq!(report.up_to_date, 1);
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn test_size_mismatch_fetches_once_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("b-800.bin");
        std::fs::write(&local, vec![0u8; 700]).unwrap();

        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::default();
        let resources = vec![Resource::file(url("b-800.bin"), 800, day(2021, 6, 1))];

        let report = planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap();
        assert_eq!(fetcher.calls(), vec![(url("b-800.bin"), local.clone())]);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.bytes_fetched, 800);
        assert_eq!(std::fs::metadata(&local).unwrap().len(), 800);

        // Second pass over the mirrored tree issues nothing
        let again = RecordingFetcher::default();
        let report = planner.run(&resources, &again, FailurePolicy::Abort).await.unwrap();
        assert!(again.calls().is_empty());
        assert_eq!(report.up_to_date, 1);
    }

    #[tokio::test]
    async fn test_window_rechecked_for_manifest_replay() {
        let temp_dir = TempDir::new().unwrap();
        let window = DateWindow::new(Some(day(2021, 3, 1)), None).unwrap();
        let planner = SyncPlanner::new(temp_dir.path(), ROOT, window);
        let fetcher = RecordingFetcher::default();

        let resources = vec![
            Resource::file(url("a-500.bin"), 500, day(2021, 1, 1)),
            Resource::file(url("b-700.bin"), 700, day(2021, 6, 1)),
        ];

        let report = planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap();
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(fetcher.calls()[0].0, url("b-700.bin"));
        assert_eq!(report.outside_window, 1);
        assert!(!temp_dir.path().join("a-500.bin").exists());
    }

    #[tokio::test]
    async fn test_creates_missing_ancestors() {
        let temp_dir = TempDir::new().unwrap();
        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::default();

        let resources = vec![Resource::file(url("2021/q1/reports/r-3.bin"), 3, day(2021, 1, 1))];
        planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap();

        let written = temp_dir.path().join("2021/q1/reports/r-3.bin");
        assert_eq!(std::fs::metadata(written).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_collections_and_foreign_paths_are_not_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::default();

        let resources = vec![
            Resource::collection(url("archive/")),
            Resource::file("https://cloud.example.com/elsewhere/x-1.bin", 1, day(2021, 1, 1)),
        ];

        let report = planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap();
        assert!(fetcher.calls().is_empty());
        assert_eq!(report.not_files, 1);
        assert_eq!(report.rejected_paths, 1);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let temp_dir = TempDir::new().unwrap();
        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::failing_on(url("a-1.bin"));

        let resources = vec![
            Resource::file(url("a-1.bin"), 1, day(2021, 1, 1)),
            Resource::file(url("b-2.bin"), 2, day(2021, 1, 1)),
        ];

        let err = planner.run(&resources, &fetcher, FailurePolicy::Abort).await.unwrap_err();
        assert!(matches!(err, SyncError::Download { status: Some(500), .. }));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_policy_collects_failures() {
        let temp_dir = TempDir::new().unwrap();
        let planner = SyncPlanner::new(temp_dir.path(), ROOT, DateWindow::unbounded());
        let fetcher = RecordingFetcher::failing_on(url("a-1.bin"));

        let resources = vec![
            Resource::file(url("a-1.bin"), 1, day(2021, 1, 1)),
            Resource::file(url("b-2.bin"), 2, day(2021, 1, 1)),
        ];

        let report = planner.run(&resources, &fetcher, FailurePolicy::Continue).await.unwrap();
        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, url("a-1.bin"));
        assert_eq!(report.attempted(), 2);
    }
}
