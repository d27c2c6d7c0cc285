//! # Sync Publisher
//!
//! Publishes the store root to the git remote after a cycle:
//!
//! 1. **stage**: `git add -A` on the store root, then check whether anything is staged at all.
//! 2. **reconcile**: `git pull --rebase --autostash`. Optional; a failure here (no upstream configured,
//!    offline) is logged and the pipeline carries on.
//! 3. **publish**: commit, then push.
//!
//! The data is already persisted when this runs, so a failure only ever costs the upload.

use crate::error::WaitsError;
use std::{
    path::PathBuf,
    process::Command,
};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SyncStage {
    Stage,
    Detect,
    Reconcile,
    Commit,
    Push,
}

impl SyncStage {
    pub fn remediation(&self) -> &'static str {
        match self {
            SyncStage::Stage | SyncStage::Detect => {
                "check that the sync repo_dir is a git work tree containing the data directory"
            }
            SyncStage::Reconcile => "run `git pull --rebase` by hand and resolve any conflicts",
            SyncStage::Commit => {
                "check `git status`; an interrupted rebase may need `git rebase --abort`, and commits need user.name/user.email"
            }
            SyncStage::Push => "run `git push` by hand; the commit is kept locally and goes out with the next successful push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait Git {
    fn run(&self, args: &[&str]) -> std::io::Result<GitOutput>;
}

/// Shells out to the `git` binary inside `repo_dir`.
pub struct SystemGit {
    repo_dir: PathBuf,
}

impl SystemGit {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

impl Git for SystemGit {
    fn run(&self, args: &[&str]) -> std::io::Result<GitOutput> {
        let output = Command::new("git").args(args).current_dir(&self.repo_dir).output()?;
        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Integrated,
    /// The pull failed; the commit goes on top of whatever is checked out locally.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NothingToCommit,
    Published { reconcile: ReconcileOutcome },
}

pub struct SyncPublisher {
    git: Box<dyn Git + Send + Sync>,
    pathspec: String,
}

impl SyncPublisher {
    /// `pathspec` is what gets staged, normally the store root.
    pub fn new(git: Box<dyn Git + Send + Sync>, pathspec: impl Into<String>) -> Self {
        Self {
            git,
            pathspec: pathspec.into(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn publish(&self, timestamp: &str) -> Result<SyncOutcome, WaitsError> {
        self.step(SyncStage::Stage, &["add", "-A", "--", self.pathspec.as_str()])?;

        if !self.has_staged_changes()? {
            info!("No changes to sync");
            return Ok(SyncOutcome::NothingToCommit);
        }

        let reconcile = match self.step(SyncStage::Reconcile, &["pull", "--rebase", "--autostash"]) {
            Ok(_) => ReconcileOutcome::Integrated,
            Err(e) => {
                warn!("{e}; committing on top of the local state");
                ReconcileOutcome::Skipped(e.to_string())
            }
        };

        let message = format!("data: wait times {timestamp}");
        self.step(SyncStage::Commit, &["commit", "-m", message.as_str(), "--", self.pathspec.as_str()])?;
        self.step(SyncStage::Push, &["push"])?;

        info!(%message, "Changes pushed");
        Ok(SyncOutcome::Published { reconcile })
    }

    /// `git diff --cached --quiet` exits 1 when something is staged and 0 when nothing is.
    fn has_staged_changes(&self) -> Result<bool, WaitsError> {
        let output = self
            .git
            .run(&["diff", "--cached", "--quiet", "--", self.pathspec.as_str()])
            .map_err(|e| failed(SyncStage::Detect, e))?;
        match output.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(failed(SyncStage::Detect, describe(&output))),
        }
    }

    fn step(&self, stage: SyncStage, args: &[&str]) -> Result<GitOutput, WaitsError> {
        debug!(%stage, ?args, "git");
        let output = self.git.run(args).map_err(|e| failed(stage, e))?;
        if output.success() {
            Ok(output)
        } else {
            Err(failed(stage, describe(&output)))
        }
    }
}

fn failed(stage: SyncStage, reason: impl ToString) -> WaitsError {
    WaitsError::SyncFailed {
        stage,
        reason: reason.to_string(),
    }
}

fn describe(output: &GitOutput) -> String {
    let detail = if output.stderr.is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    match output.code {
        Some(code) => format!("git exited with {code}: {detail}"),
        None => format!("git was terminated by a signal: {detail}"),
    }
}
