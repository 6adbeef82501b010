//! Local records of submitted evaluation jobs.
//!
//! An evaluation response carries the status and download URLs only once.
//! The store keeps each [`JobTracker`] as `<key>.json` so later `status` and
//! `download` runs can find it again by task id or status URL.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::render::{sanitize_key, JobTracker};

/// Directory of saved job trackers.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store under `<workspace>/.ragdesk/jobs`.
    pub fn for_workspace(workspace: &Path) -> Self {
        Self::new(workspace.join(".ragdesk").join("jobs"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the tracker, replacing any earlier record with the same key.
    ///
    /// Returns `None` when the job has neither a task id nor a status URL.
    pub fn save(&self, job: &JobTracker) -> Result<Option<PathBuf>, StoreError> {
        let Some(key) = job.key() else {
            warn!("Job has no task id or status URL; not saved");
            return Ok(None);
        };
        let path = self.dir.join(format!("{key}.json"));
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(job)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), status = %job.status, "Saved job");
        Ok(Some(path))
    }

    /// Find a saved job by task id or status URL.
    pub fn find(&self, reference: &str) -> Result<Option<JobTracker>, StoreError> {
        let direct = self.dir.join(format!("{}.json", sanitize_key(reference.trim())));
        if let Some(job) = load(&direct)? {
            if job.matches(reference) {
                return Ok(Some(job));
            }
        }
        Ok(self.list()?.into_iter().find(|job| job.matches(reference)))
    }

    /// All saved jobs, ordered by file name. Unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<JobTracker>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            match load(&path) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }
}

fn load(path: &Path) -> Result<Option<JobTracker>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}
