//! GitLab provider speaking API v4.
//!
//! Merge requests surface through the unified contract with the `iid` as
//! the exposed number.

use super::{
    token_from_helper, CreatePullRequest, Forge, MergeMethod, MergeOptions, PullRequest,
    UpdatePullRequest,
};
use crate::errors::{Error, Result};
use crate::stack::PrState;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct GitLab {
    http: Client,
    /// Instance root, e.g. `https://gitlab.example.com`.
    base_url: String,
    /// URL-encoded project path, e.g. `owner%2Frepo`.
    project: String,
}

impl GitLab {
    /// True for gitlab.com and self-hosted instances with a gitlab host.
    pub fn matches(remote_url: &str) -> bool {
        remote_url.contains("gitlab.")
    }

    /// Build a client for the project behind a remote URL. The token comes
    /// from explicit configuration, then `GITLAB_TOKEN`, then
    /// `GITLAB_PRIVATE_TOKEN`, then the `glab` CLI.
    pub fn from_remote(remote_url: &str, token: Option<String>) -> Result<Self> {
        let (base_url, project_path) = split_remote(remote_url)?;
        let token = resolve_token(token)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "PRIVATE-TOKEN",
            HeaderValue::from_str(&token)
                .map_err(|err| Error::auth(format!("invalid token: {err}")))?,
        );

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("stackline/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            project: encode_path(&project_path),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4/projects/{}/{}", self.base_url, self.project, path)
    }
}

/// Split a remote URL into the instance root and the project path.
fn split_remote(remote_url: &str) -> Result<(String, String)> {
    // SSH form: git@gitlab.com:owner/repo.git
    if let Some(rest) = remote_url.strip_prefix("git@") {
        let (host, path) = rest
            .split_once(':')
            .ok_or_else(|| Error::state(format!("invalid SSH remote URL: {remote_url}")))?;
        return Ok((
            format!("https://{host}"),
            path.trim_end_matches(".git").to_string(),
        ));
    }

    if remote_url.starts_with("http://") || remote_url.starts_with("https://") {
        let parsed = url::Url::parse(remote_url)
            .map_err(|err| Error::state(format!("invalid remote URL: {err}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::state(format!("invalid remote URL: {remote_url}")))?;
        let root = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };
        let path = parsed
            .path()
            .trim_start_matches('/')
            .trim_end_matches(".git")
            .to_string();
        if path.is_empty() {
            return Err(Error::state(format!("invalid remote URL: {remote_url}")));
        }
        return Ok((root, path));
    }

    Err(Error::state(format!(
        "unrecognized remote URL format: {remote_url}"
    )))
}

/// Percent-encode a project path or branch name for use in a URL path.
fn encode_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(token) = explicit {
        if !token.is_empty() {
            return Ok(token);
        }
    }
    for var in ["GITLAB_TOKEN", "GITLAB_PRIVATE_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }
    if let Some(token) = token_from_helper("glab", &["auth", "token"]) {
        return Ok(token);
    }
    Err(Error::auth(
        "no GitLab token found; set GITLAB_TOKEN or login with 'glab auth login'",
    ))
}

fn forge_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Error::forge(status, body)
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    web_url: String,
    state: String,
    title: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
}

impl MergeRequestResponse {
    fn into_pull_request(self) -> PullRequest {
        let state = map_state(&self.state, self.draft || self.work_in_progress);
        PullRequest {
            number: self.iid,
            url: self.web_url,
            state,
            title: self.title,
            head: self.source_branch,
            base: self.target_branch,
        }
    }
}

/// GitLab states are `opened`, `closed`, `merged`; draft raises an opened
/// MR to draft.
fn map_state(raw: &str, draft: bool) -> PrState {
    match raw {
        "merged" => PrState::Merged,
        "closed" => PrState::Closed,
        _ if draft => PrState::Draft,
        _ => PrState::Open,
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    title: String,
    source_branch: &'a str,
    target_branch: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_event: Option<&'a str>,
}

#[derive(Debug, Serialize, Default)]
struct MergeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    squash: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merge_commit_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    should_remove_source_branch: Option<bool>,
}

impl Forge for GitLab {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn create(&self, req: &CreatePullRequest) -> Result<PullRequest> {
        let url = self.api_url("merge_requests");
        debug!("POST {url}");

        // GitLab has no draft boolean on create; the title prefix is the API
        let title = if req.draft {
            format!("Draft: {}", req.title)
        } else {
            req.title.clone()
        };
        let body = CreateBody {
            title,
            source_branch: &req.head,
            target_branch: &req.base,
            description: &req.body,
            labels: if req.labels.is_empty() {
                None
            } else {
                Some(req.labels.join(","))
            },
        };

        let response = self.http.post(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let parsed: MergeRequestResponse = response.json()?;
        Ok(parsed.into_pull_request())
    }

    fn get(&self, number: u64) -> Result<PullRequest> {
        let url = self.api_url(&format!("merge_requests/{number}"));
        debug!("GET {url}");

        let response = self.http.get(&url).send()?;
        if response.status().as_u16() == 404 {
            return Err(Error::not_found(format!("MR !{number} not found")));
        }
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let parsed: MergeRequestResponse = response.json()?;
        Ok(parsed.into_pull_request())
    }

    fn get_by_branch(&self, branch: &str) -> Result<Option<PullRequest>> {
        let url = self.api_url("merge_requests");
        debug!("GET {url}?source_branch={branch}");

        let response = self
            .http
            .get(&url)
            .query(&[("source_branch", branch), ("state", "opened")])
            .send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let mut parsed: Vec<MergeRequestResponse> = response.json()?;
        if parsed.is_empty() {
            return Ok(None);
        }
        Ok(Some(parsed.remove(0).into_pull_request()))
    }

    fn update(&self, number: u64, update: &UpdatePullRequest) -> Result<()> {
        let state_event = update.state.and_then(|state| match state {
            PrState::Closed => Some("close"),
            PrState::Open | PrState::Draft => Some("reopen"),
            PrState::Merged => None,
        });
        let body = UpdateBody {
            title: update.title.as_deref(),
            description: update.body.as_deref(),
            state_event,
        };
        if body.title.is_none() && body.description.is_none() && body.state_event.is_none() {
            return Ok(());
        }

        let url = self.api_url(&format!("merge_requests/{number}"));
        debug!("PUT {url}");

        let response = self.http.put(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }

    fn retarget(&self, number: u64, new_base: &str) -> Result<()> {
        let url = self.api_url(&format!("merge_requests/{number}"));
        debug!("PUT {url} target_branch={new_base}");

        let body = serde_json::json!({ "target_branch": new_base });
        let response = self.http.put(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }

    fn merge(&self, number: u64, opts: &MergeOptions) -> Result<()> {
        let url = self.api_url(&format!("merge_requests/{number}/merge"));
        debug!("PUT {url}");

        let message = match (&opts.commit_title, &opts.commit_message) {
            (Some(title), Some(msg)) => Some(format!("{title}\n\n{msg}")),
            (Some(title), None) => Some(title.clone()),
            (None, Some(msg)) => Some(msg.clone()),
            (None, None) => None,
        };
        let body = MergeBody {
            squash: (opts.method == MergeMethod::Squash).then_some(true),
            merge_commit_message: message,
            should_remove_source_branch: opts.delete_branch.then_some(true),
        };

        let response = self.http.put(&url).json(&body).send()?;
        match response.status().as_u16() {
            401 => Err(Error::auth("unauthorized: check your GitLab token permissions")),
            405 => Err(Error::state(
                "MR cannot be merged (not mergeable, requires approval, or has conflicts)",
            )),
            406 => Err(Error::conflict("MR has conflicts that must be resolved")),
            _ if !response.status().is_success() => Err(forge_error(response)),
            _ => Ok(()),
        }
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        let url = self.api_url(&format!("repository/branches/{}", encode_path(branch)));
        debug!("DELETE {url}");

        let response = self.http.delete(&url).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }
}
