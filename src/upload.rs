// Upload flow: create the upload, then poll Strava until the file has
// become an activity. Also the batch variant driven by a glob pattern.

use crate::api::{activity_url, StravaClient, UploadRequest, UploadStatus};
use crate::error::{Result, UploadError};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing knobs for polling and batches.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Pause between files of a batch, to stay under Strava's rate limit.
    pub between_uploads: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            poll_interval: Duration::from_secs(2),
            max_attempts: 30,
            between_uploads: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub upload_id: u64,
    pub activity_id: u64,
    pub url: String,
}

/// Hooks for showing progress. All methods default to doing nothing.
pub trait Progress {
    fn started(&self, _file: &std::path::Path) {}
    fn created(&self, _upload: &UploadStatus) {}
    fn polled(&self, _upload: &UploadStatus, _attempt: u32, _max_attempts: u32) {}
    fn finished(&self) {}
}

/// Progress sink that shows nothing.
pub struct Quiet;

impl Progress for Quiet {}

/// Upload one file and wait for Strava to finish processing it.
pub fn upload_file(
    client: &StravaClient,
    req: &UploadRequest,
    opts: &UploadOptions,
    progress: &dyn Progress,
) -> Result<UploadOutcome> {
    if !req.file.is_file() {
        return Err(UploadError::FileNotFound(req.file.clone()));
    }
    progress.started(&req.file);
    let result = create_and_wait(client, req, opts, progress);
    progress.finished();
    result
}

fn create_and_wait(
    client: &StravaClient,
    req: &UploadRequest,
    opts: &UploadOptions,
    progress: &dyn Progress,
) -> Result<UploadOutcome> {
    let created = client.create_upload(req)?;
    progress.created(&created);
    if let Some(outcome) = settled(&created)? {
        return Ok(outcome);
    }

    let upload_id = created.id;
    for attempt in 1..=opts.max_attempts {
        thread::sleep(opts.poll_interval);
        let status = client.upload_status(upload_id)?;
        debug!(upload_id, attempt, status = ?status.status, "polled upload");
        if let Some(outcome) = settled(&status)? {
            info!(upload_id, activity_id = outcome.activity_id, "upload processed");
            return Ok(outcome);
        }
        progress.polled(&status, attempt, opts.max_attempts);
    }

    warn!(upload_id, attempts = opts.max_attempts, "gave up waiting on upload");
    Err(UploadError::Timeout {
        upload_id,
        attempts: opts.max_attempts,
    })
}

/// `Some` once the upload has an activity, `Err` if Strava reported an
/// error, `None` while still processing.
fn settled(status: &UploadStatus) -> Result<Option<UploadOutcome>> {
    if let Some(error) = status.error.as_deref().filter(|e| !e.is_empty()) {
        return Err(UploadError::Processing(error.to_string()));
    }
    Ok(status.activity_id.map(|activity_id| UploadOutcome {
        upload_id: status.id,
        activity_id,
        url: activity_url(activity_id),
    }))
}

/// Per-file results of a batch upload, in upload order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(PathBuf, Result<UploadOutcome>)>,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.successful() == self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Files matching `pattern`, sorted. Unreadable entries are skipped.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| UploadError::Config(format!("bad pattern {:?}: {}", pattern, e)))?;
    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("skipping {}: {}", e.path().display(), e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Upload `files` in order. One failure does not stop the rest of the
/// batch.
pub fn upload_multiple(
    client: &StravaClient,
    files: Vec<PathBuf>,
    activity_type: &str,
    opts: &UploadOptions,
    progress: &dyn Progress,
) -> BatchReport {
    info!(count = files.len(), "batch upload");

    let mut report = BatchReport::default();
    let total = files.len();
    for (i, file) in files.into_iter().enumerate() {
        let mut req = UploadRequest::new(file.clone());
        req.activity_type = activity_type.to_string();
        let result = upload_file(client, &req, opts, progress);
        if let Err(e) = &result {
            warn!(file = %file.display(), "upload failed: {}", e);
        }
        report.results.push((file, result));
        if i + 1 < total {
            thread::sleep(opts.between_uploads);
        }
    }
    report
}
