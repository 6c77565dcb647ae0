//! Provider-agnostic pull request operations.
//!
//! One capability set covers every forge; callers never branch on the
//! provider except to select the instance, which happens by sniffing the
//! remote URL.

pub mod github;
pub mod gitlab;
pub mod section;

pub use github::GitHub;
pub use gitlab::GitLab;
pub use section::{render_stack_section, SectionEntry};

use crate::errors::{Error, Result};
use crate::settings::Settings;
use crate::stack::{PrRecord, PrState};
use std::fmt;

/// A pull request as reported by a forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: PrState,
    pub title: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
}

impl PullRequest {
    /// The subset persisted in the stack file.
    pub fn to_record(&self) -> PrRecord {
        PrRecord {
            number: self.number,
            url: self.url.clone(),
            state: self.state,
            title: Some(self.title.clone()),
        }
    }
}

/// Options for creating a pull request.
#[derive(Debug, Clone, Default)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
    pub reviewers: Vec<String>,
    pub labels: Vec<String>,
}

/// Partial update; `None` fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct UpdatePullRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<PrState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub method: MergeMethod,
    pub commit_title: Option<String>,
    pub commit_message: Option<String>,
    pub delete_branch: bool,
}

/// Unified operations every forge provides.
pub trait Forge: std::fmt::Debug {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Create a PR for `head -> base`.
    fn create(&self, req: &CreatePullRequest) -> Result<PullRequest>;

    /// Fetch a PR by number, state normalized.
    fn get(&self, number: u64) -> Result<PullRequest>;

    /// The open PR whose source branch matches, if any.
    fn get_by_branch(&self, branch: &str) -> Result<Option<PullRequest>>;

    fn update(&self, number: u64, update: &UpdatePullRequest) -> Result<()>;

    /// Change the PR's target branch.
    fn retarget(&self, number: u64, new_base: &str) -> Result<()>;

    fn close(&self, number: u64) -> Result<()> {
        self.update(
            number,
            &UpdatePullRequest {
                state: Some(PrState::Closed),
                ..Default::default()
            },
        )
    }

    fn merge(&self, number: u64, opts: &MergeOptions) -> Result<()>;

    /// Delete the remote ref through the forge API.
    fn delete_branch(&self, branch: &str) -> Result<()>;
}

/// Select a provider by sniffing the remote URL.
pub fn detect_forge(remote_url: &str, settings: &Settings) -> Result<Box<dyn Forge>> {
    if GitHub::matches(remote_url) {
        let provider = GitHub::from_remote(remote_url, settings.forge.github_token.clone())?;
        return Ok(Box::new(provider));
    }
    if GitLab::matches(remote_url) {
        let provider = GitLab::from_remote(remote_url, settings.forge.gitlab_token.clone())?;
        return Ok(Box::new(provider));
    }
    Err(Error::state(format!("unsupported remote: {remote_url}")))
}

/// Extract `(owner, repo)` from an SSH or HTTPS remote URL.
pub fn parse_remote_url(remote_url: &str) -> Result<(String, String)> {
    // SSH form: git@github.com:owner/repo.git
    if let Some(rest) = remote_url.strip_prefix("git@") {
        let (_, path) = rest
            .split_once(':')
            .ok_or_else(|| Error::state(format!("invalid SSH remote URL: {remote_url}")))?;
        let path = path.trim_end_matches(".git");
        let (owner, repo) = path
            .split_once('/')
            .ok_or_else(|| Error::state(format!("invalid SSH remote path: {path}")))?;
        return Ok((owner.to_string(), repo.to_string()));
    }

    // HTTPS form: https://github.com/owner/repo.git
    if remote_url.starts_with("http://") || remote_url.starts_with("https://") {
        let parsed = url::Url::parse(remote_url)
            .map_err(|err| Error::state(format!("invalid remote URL: {err}")))?;
        let mut segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(Error::state(format!("invalid remote URL: {remote_url}")));
        }
        let repo = segments.pop().unwrap().trim_end_matches(".git").to_string();
        let owner = segments.pop().unwrap().to_string();
        return Ok((owner, repo));
    }

    Err(Error::state(format!(
        "unrecognized remote URL format: {remote_url}"
    )))
}

/// Run a helper command to obtain a token (e.g. `gh auth token`).
pub(crate) fn token_from_helper(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
