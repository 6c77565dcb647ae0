//! GitHub provider speaking REST v3.

use super::{
    parse_remote_url, token_from_helper, CreatePullRequest, Forge, MergeOptions, PullRequest,
    UpdatePullRequest,
};
use crate::errors::{Error, Result};
use crate::stack::PrState;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_ROOT: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug)]
pub struct GitHub {
    http: Client,
    owner: String,
    repo: String,
}

impl GitHub {
    /// True when the remote URL points at GitHub.
    pub fn matches(remote_url: &str) -> bool {
        remote_url.contains("github.com")
    }

    /// Build a client for the repository behind a remote URL. The token
    /// comes from explicit configuration, then `GITHUB_TOKEN`, then the
    /// `gh` CLI.
    pub fn from_remote(remote_url: &str, token: Option<String>) -> Result<Self> {
        let (owner, repo) = parse_remote_url(remote_url)?;
        let token = resolve_token(token)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| Error::auth(format!("invalid token: {err}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("stackline/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self { http, owner, repo })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{API_ROOT}/repos/{}/{}/{}", self.owner, self.repo, path)
    }
}

fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(token) = explicit {
        if !token.is_empty() {
            return Ok(token);
        }
    }
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }
    if let Some(token) = token_from_helper("gh", &["auth", "token"]) {
        return Ok(token);
    }
    Err(Error::auth(
        "no GitHub token found; set GITHUB_TOKEN or login with 'gh auth login'",
    ))
}

fn forge_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Error::forge(status, body)
}

#[derive(Debug, Deserialize)]
struct RefName {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    state: String,
    title: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged: bool,
    head: RefName,
    base: RefName,
}

impl PullResponse {
    /// GitHub reports open/closed plus separate merged/draft booleans;
    /// merged wins, then draft.
    fn into_pull_request(self) -> PullRequest {
        let state = if self.merged {
            PrState::Merged
        } else if self.draft {
            PrState::Draft
        } else {
            parse_state(&self.state)
        };
        PullRequest {
            number: self.number,
            url: self.html_url,
            state,
            title: self.title,
            head: self.head.name,
            base: self.base.name,
        }
    }
}

fn parse_state(raw: &str) -> PrState {
    match raw {
        "closed" => PrState::Closed,
        _ => PrState::Open,
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
    draft: bool,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MergeBody<'a> {
    merge_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_message: Option<&'a str>,
}

impl Forge for GitHub {
    fn name(&self) -> &'static str {
        "github"
    }

    fn create(&self, req: &CreatePullRequest) -> Result<PullRequest> {
        let url = self.api_url("pulls");
        debug!("POST {url}");

        let body = CreateBody {
            title: &req.title,
            head: &req.head,
            base: &req.base,
            body: &req.body,
            draft: req.draft,
        };
        let response = self.http.post(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let parsed: PullResponse = response.json()?;
        Ok(parsed.into_pull_request())
    }

    fn get(&self, number: u64) -> Result<PullRequest> {
        let url = self.api_url(&format!("pulls/{number}"));
        debug!("GET {url}");

        let response = self.http.get(&url).send()?;
        if response.status().as_u16() == 404 {
            return Err(Error::not_found(format!("PR #{number} not found")));
        }
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let parsed: PullResponse = response.json()?;
        Ok(parsed.into_pull_request())
    }

    fn get_by_branch(&self, branch: &str) -> Result<Option<PullRequest>> {
        let url = self.api_url("pulls");
        debug!("GET {url}?head={}:{branch}", self.owner);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("head", format!("{}:{branch}", self.owner)),
                ("state", "open".to_string()),
            ])
            .send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        let mut parsed: Vec<PullResponse> = response.json()?;
        if parsed.is_empty() {
            return Ok(None);
        }
        Ok(Some(parsed.remove(0).into_pull_request()))
    }

    fn update(&self, number: u64, update: &UpdatePullRequest) -> Result<()> {
        if update.title.is_none() && update.body.is_none() && update.state.is_none() {
            return Ok(());
        }
        let body = UpdateBody {
            title: update.title.as_deref(),
            body: update.body.as_deref(),
            state: update.state.map(|state| match state {
                PrState::Closed => "closed",
                _ => "open",
            }),
        };

        let url = self.api_url(&format!("pulls/{number}"));
        debug!("PATCH {url}");

        let response = self.http.patch(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }

    fn retarget(&self, number: u64, new_base: &str) -> Result<()> {
        let url = self.api_url(&format!("pulls/{number}"));
        debug!("PATCH {url} base={new_base}");

        let body = serde_json::json!({ "base": new_base });
        let response = self.http.patch(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }

    fn merge(&self, number: u64, opts: &MergeOptions) -> Result<()> {
        let url = self.api_url(&format!("pulls/{number}/merge"));
        debug!("PUT {url}");

        let body = MergeBody {
            merge_method: opts.method.to_string(),
            commit_title: opts.commit_title.as_deref(),
            commit_message: opts.commit_message.as_deref(),
        };
        let response = self.http.put(&url).json(&body).send()?;
        match response.status().as_u16() {
            405 => Err(Error::state(
                "PR cannot be merged (not mergeable or requires review)",
            )),
            409 => Err(Error::conflict("PR has conflicts that must be resolved")),
            _ if !response.status().is_success() => Err(forge_error(response)),
            _ => Ok(()),
        }
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        let url = self.api_url(&format!("git/refs/heads/{branch}"));
        debug!("DELETE {url}");

        let response = self.http.delete(&url).send()?;
        if !response.status().is_success() {
            return Err(forge_error(response));
        }
        Ok(())
    }
}
