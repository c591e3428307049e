//! Sync options and their merging.
//!
//! Options come in layers: the adapter defaults, then the model's own
//! options, then the options of one call. Later layers win field by field.
//! The free-form `extra` map is merged deeply. The cache namespace is an
//! opaque shared reference: it is replaced as a whole, never merged.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handle::CacheNamespace;
use crate::storage::Credential;
use crate::sync::error::SyncError;

/// Called with the result of a successful job.
pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Called with the error of a failed job.
pub type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

pub const ENV_TOKEN: &str = "GITRECORDS_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_USER: &str = "GITRECORDS_USER";
pub const ENV_REPO: &str = "GITRECORDS_REPO";
pub const ENV_BRANCH: &str = "GITRECORDS_BRANCH";
pub const ENV_CONCURRENCY: &str = "GITRECORDS_CONCURRENCY";

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// token for the remote; required in the adapter defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,

    /// repository owner, used when the model url names no repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// repository name, used together with `user`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// branch to read when the url has no `/tree/<branch>/` part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// sync queue slots; only read from the adapter defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// anything else, passed through to event sinks untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    #[serde(skip)]
    pub cache: Option<CacheNamespace>,

    #[serde(skip)]
    pub success: Option<SuccessCallback>,

    #[serde(skip)]
    pub error: Option<ErrorCallback>,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, credential: impl Into<Credential>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_repository(mut self, user: impl Into<String>, repo: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.repo = Some(repo.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_cache(mut self, cache: CacheNamespace) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }

    /// true when a callback wants the job's outcome
    pub fn has_callbacks(&self) -> bool {
        self.success.is_some() || self.error.is_some()
    }

    /// Merge `layer` on top of `self`.
    pub fn merge_from(&mut self, layer: &SyncOptions) {
        overwrite(&mut self.credential, &layer.credential);
        overwrite(&mut self.user, &layer.user);
        overwrite(&mut self.repo, &layer.repo);
        overwrite(&mut self.branch, &layer.branch);
        overwrite(&mut self.concurrency, &layer.concurrency);
        overwrite(&mut self.cache, &layer.cache);
        overwrite(&mut self.success, &layer.success);
        overwrite(&mut self.error, &layer.error);
        deep_merge(&mut self.extra, &layer.extra);
    }

    /// Merge layers left to right into fresh options.
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a SyncOptions>) -> SyncOptions {
        let mut options = SyncOptions::default();
        for layer in layers {
            options.merge_from(layer);
        }
        options
    }

    /// Defaults read from the process environment.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env_overrides();
        options
    }

    /// Overwrite fields from `GITRECORDS_*` variables. Invalid values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_value(ENV_TOKEN).or_else(|| env_value(ENV_GITHUB_TOKEN)) {
            self.credential = Some(Credential::new(token));
        }
        if let Some(user) = env_value(ENV_USER) {
            self.user = Some(user);
        }
        if let Some(repo) = env_value(ENV_REPO) {
            self.repo = Some(repo);
        }
        if let Some(branch) = env_value(ENV_BRANCH) {
            self.branch = Some(branch);
        }
        if let Some(raw) = env_value(ENV_CONCURRENCY) {
            match raw.parse::<usize>() {
                Ok(value) if value > 0 => self.concurrency = Some(value),
                Ok(_) => tracing::warn!("{ENV_CONCURRENCY} must be at least 1, ignoring"),
                Err(err) => tracing::warn!("invalid {ENV_CONCURRENCY}, ignoring: {err}"),
            }
        }
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("credential", &self.credential)
            .field("user", &self.user)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("concurrency", &self.concurrency)
            .field("extra", &self.extra)
            .field("cache", &self.cache)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

fn overwrite<T: Clone>(target: &mut Option<T>, layer: &Option<T>) {
    if let Some(value) = layer {
        *target = Some(value.clone());
    }
}

/// objects recurse, anything else replaces
fn deep_merge(target: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
