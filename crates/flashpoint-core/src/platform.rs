//! Hosting platform capabilities.
//!
//! [`PlatformClient`] covers the mutating operations the provisioning and
//! reclamation pipelines need; [`HerokuCli`] implements it by shelling out to
//! the `heroku` CLI. [`ActivityApi`] is the read-only activity query used by
//! the liveness prober; [`HerokuApi`] implements it against the Platform API.

use crate::error::{FlashpointError, Result};
use crate::paths;
use crate::process;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;

pub const API_ACCEPT: &str = "application/vnd.heroku+json; version=3";
pub const API_KEY_ENV: &str = "HEROKU_API_KEY";

// ---------------------------------------------------------------------------
// PlatformClient
// ---------------------------------------------------------------------------

/// Mutating platform operations. Each returns the command's combined output.
pub trait PlatformClient {
    fn fork(&self, parent_app: &str, new_app: &str) -> Result<String>;
    fn set_config(&self, app: &str, vars: &BTreeMap<String, String>) -> Result<String>;
    fn run_remote_script(&self, app: &str, command: &str) -> Result<String>;
    fn destroy_app(&self, app: &str) -> Result<String>;
    fn list_collaborators(&self, app: &str) -> Result<Vec<String>>;
    fn add_collaborator(&self, app: &str, identity: &str) -> Result<()>;
}

/// `heroku` CLI backed [`PlatformClient`].
#[derive(Debug, Clone)]
pub struct HerokuCli {
    program: String,
}

impl Default for HerokuCli {
    fn default() -> Self {
        Self {
            program: "heroku".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessEntry {
    user: AccessUser,
}

#[derive(Debug, Deserialize)]
struct AccessUser {
    email: String,
}

impl HerokuCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn heroku(&self, args: &[&str]) -> Result<String> {
        process::run(&self.program, args, None)
    }

    /// Bearer token for the Platform API: `HEROKU_API_KEY` if set, otherwise
    /// whatever `heroku auth:token` prints.
    pub fn auth_token(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        let out = process::run(&self.program, &["auth:token"], None)?;
        let token = out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('›'))
            .unwrap_or_default()
            .to_string();
        if token.is_empty() {
            return Err(FlashpointError::Subprocess {
                command: process::describe(&self.program, &["auth:token"]),
                output: "no token printed; run `heroku login`".to_string(),
            });
        }
        Ok(token)
    }
}

impl PlatformClient for HerokuCli {
    fn fork(&self, parent_app: &str, new_app: &str) -> Result<String> {
        self.heroku(&["fork", "--from", parent_app, "--to", new_app])
    }

    fn set_config(&self, app: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        let pairs: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args = vec!["config:set", "--app", app];
        args.extend(pairs.iter().map(String::as_str));
        // Values can be secrets; keep them out of error messages.
        let keys: Vec<&str> = vars.keys().map(String::as_str).collect();
        let description = format!(
            "{} config:set --app {app} {}",
            self.program,
            keys.iter().map(|k| format!("{k}=…")).collect::<Vec<_>>().join(" ")
        );
        process::run_described(&self.program, &args, None, &description)
    }

    fn run_remote_script(&self, app: &str, command: &str) -> Result<String> {
        self.heroku(&["run", "--app", app, command])
    }

    fn destroy_app(&self, app: &str) -> Result<String> {
        self.heroku(&["apps:destroy", "--app", app, "--confirm", app])
    }

    fn list_collaborators(&self, app: &str) -> Result<Vec<String>> {
        let out = self.heroku(&["access", "--app", app, "--json"])?;
        parse_access_json(&out)
    }

    fn add_collaborator(&self, app: &str, identity: &str) -> Result<()> {
        self.heroku(&["access:add", identity, "--app", app])?;
        Ok(())
    }
}

fn parse_access_json(out: &str) -> Result<Vec<String>> {
    // The CLI may print warnings before the JSON document.
    let start = out.find('[').unwrap_or(0);
    let entries: Vec<AccessEntry> = serde_json::from_str(out[start..].trim())?;
    Ok(entries.into_iter().map(|e| e.user.email).collect())
}

// ---------------------------------------------------------------------------
// ActivityApi
// ---------------------------------------------------------------------------

/// What the platform reports about an app's recent activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppActivity {
    /// The app exists; `last_updated` is the latest activity timestamp seen.
    Found { last_updated: Option<DateTime<Utc>> },
    /// The platform answered with an authoritative "not found".
    NotFound,
}

pub trait ActivityApi {
    fn query_app_activity(&self, app: &str) -> Result<AppActivity>;
}

/// Platform API client authenticated with a bearer token.
pub struct HerokuApi {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Dyno {
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AppInfo {
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    id: String,
}

enum Fetched<T> {
    Ok(T),
    NotFound,
}

impl HerokuApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("flashpoint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FlashpointError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: paths::PLATFORM_API_URL.to_string(),
            token: token.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Fetched<T>> {
        let url = format!("{}{path}", self.base_url);
        self.retry.run(&url, || {
            let resp = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, API_ACCEPT)
                .bearer_auth(&self.token)
                .send()
                .map_err(|e| FlashpointError::Transport(e.to_string()))?;
            decode(resp)
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<Fetched<T>> {
    let status = resp.status();
    let body = resp
        .text()
        .map_err(|e| FlashpointError::Transport(e.to_string()))?;

    if status.is_success() {
        return Ok(Fetched::Ok(serde_json::from_str(&body)?));
    }
    if status == StatusCode::NOT_FOUND {
        let authoritative = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.id == "not_found")
            .unwrap_or(false);
        if authoritative {
            return Ok(Fetched::NotFound);
        }
    }
    Err(FlashpointError::Api {
        status: status.as_u16(),
        body,
    })
}

impl ActivityApi for HerokuApi {
    fn query_app_activity(&self, app: &str) -> Result<AppActivity> {
        let dynos: Vec<Dyno> = match self.get(&format!("/apps/{app}/dynos"))? {
            Fetched::Ok(d) => d,
            Fetched::NotFound => return Ok(AppActivity::NotFound),
        };
        if let Some(latest) = dynos.iter().map(|d| d.updated_at).max() {
            return Ok(AppActivity::Found {
                last_updated: Some(latest),
            });
        }

        // No dynos (scaled to zero): fall back to the app's own timestamp.
        match self.get::<AppInfo>(&format!("/apps/{app}"))? {
            Fetched::Ok(info) => Ok(AppActivity::Found {
                last_updated: Some(info.updated_at),
            }),
            Fetched::NotFound => Ok(AppActivity::NotFound),
        }
    }
}

/// [`ActivityApi`] that resolves a bearer token on first use and keeps the
/// outcome, success or failure, for the rest of the process.
pub struct LazyHerokuApi {
    token_source: Box<dyn Fn() -> Result<String>>,
    inner: OnceCell<std::result::Result<HerokuApi, String>>,
}

impl LazyHerokuApi {
    pub fn new(cli: HerokuCli) -> Self {
        Self::with_token_source(move || cli.auth_token())
    }

    pub fn with_token_source(token_source: impl Fn() -> Result<String> + 'static) -> Self {
        Self {
            token_source: Box::new(token_source),
            inner: OnceCell::new(),
        }
    }

    fn api(&self) -> Result<&HerokuApi> {
        let resolved = self.inner.get_or_init(|| {
            (self.token_source)()
                .and_then(|token| HerokuApi::new(token))
                .map_err(|e| {
                    tracing::warn!(error = %e, "cannot authenticate against the platform API");
                    e.to_string()
                })
        });
        resolved
            .as_ref()
            .map_err(|reason| FlashpointError::Auth(reason.clone()))
    }
}

impl ActivityApi for LazyHerokuApi {
    fn query_app_activity(&self, app: &str) -> Result<AppActivity> {
        self.api()?.query_app_activity(app)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
