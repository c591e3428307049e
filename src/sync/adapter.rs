//! The sync adapter: entry point for model persistence calls.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::handle::{CacheRoot, GithubConnector, Registry, RemoteConnector, RepositoryHandle};
use crate::storage::{Credential, RepoId};
use crate::sync::address;
use crate::sync::error::{ConfigError, ConfigResult, SyncError, SyncResult};
use crate::sync::job::{Job, JobHandle, Method};
use crate::sync::model::Model;
use crate::sync::options::SyncOptions;
use crate::sync::queue::{QueueStats, SyncQueue, DEFAULT_CONCURRENCY};
use crate::sync::resolver::Resolver;

/// Translates `sync(method, model, options)` calls into queued jobs.
///
/// Clone this to share - it uses Arc internally.
#[derive(Clone)]
pub struct Adapter {
    defaults: SyncOptions,
    credential: Credential,
    registry: Arc<Registry>,
    queue: SyncQueue,
}

impl Adapter {
    /// Adapter for GitHub with an in-memory cache.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(defaults: SyncOptions) -> ConfigResult<Self> {
        Self::with_parts(defaults, Arc::new(GithubConnector::new()?), CacheRoot::in_memory())
    }

    /// Adapter with an explicit remote connector and cache location.
    ///
    /// The queue starts paused and resumes once `cache_root` is initialised.
    pub fn with_parts(
        defaults: SyncOptions,
        connector: Arc<dyn RemoteConnector>,
        cache_root: CacheRoot,
    ) -> ConfigResult<Self> {
        let credential = match &defaults.credential {
            Some(credential) if !credential.is_empty() => credential.clone(),
            _ => return Err(ConfigError::MissingCredential),
        };
        let concurrency = defaults.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "concurrency".into(),
                value: concurrency.to_string(),
            });
        }

        let queue = SyncQueue::new(concurrency, Arc::new(Resolver));
        let registry = Arc::new(Registry::new(connector, cache_root.clone()));

        let waiting = queue.clone();
        tokio::spawn(async move {
            if let Err(err) = cache_root.init().await {
                warn!(error = %err, "cache initialisation failed, objects will not be persisted");
            }
            info!("cache ready");
            waiting.resume();
        });

        Ok(Self {
            defaults,
            credential,
            registry,
            queue,
        })
    }

    /// Queue `method` on `model`.
    ///
    /// Options merge as defaults, then the model's options, then `options`.
    /// The returned handle resolves with the job's outcome; `success`/`error`
    /// callbacks in the merged options are invoked once as well.
    pub fn sync(&self, method: impl Into<Method>, model: Model, options: SyncOptions) -> JobHandle {
        let method = method.into();
        let options = SyncOptions::merged([&self.defaults, model.options(), &options]);

        if method != Method::Read {
            debug!(%method, "sync call rejected, only reads are supported");
            return deliver(JobHandle::ready(Err(SyncError::UnsupportedMethod(method.to_string()))), &options);
        }

        let handle = match self.handle_for(&model, &options) {
            Ok(repository) => {
                let job = Job::new(method, model, repository, options.clone());
                self.queue.push(job)
            }
            Err(err) => {
                debug!(%method, error = %err, "sync call rejected before queueing");
                JobHandle::ready(Err(err))
            }
        };
        deliver(handle, &options)
    }

    /// Shorthand for a read with no call options.
    pub fn read(&self, model: Model) -> JobHandle {
        self.sync(Method::Read, model, SyncOptions::default())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    fn handle_for(&self, model: &Model, options: &SyncOptions) -> SyncResult<RepositoryHandle> {
        let repo = repository_for(model, options)?;
        let credential = options.credential.as_ref().unwrap_or(&self.credential);
        Ok(self.registry.get_handle(&repo, credential, options.cache.as_ref())?)
    }
}

/// `owner/name` from the model address, else from the `user`/`repo` options.
pub fn repository_for(model: &Model, options: &SyncOptions) -> SyncResult<RepoId> {
    let url = model.url();
    if let Some(repo) = url.as_deref().and_then(address::repo_id) {
        return Ok(repo);
    }
    match (&options.user, &options.repo) {
        (Some(user), Some(repo)) => Ok(RepoId::new(user.as_str(), repo.as_str())?),
        _ => Err(SyncError::UnknownRepository(url.unwrap_or_default())),
    }
}

/// Hook the callbacks onto a job's outcome.
fn deliver(handle: JobHandle, options: &SyncOptions) -> JobHandle {
    if !options.has_callbacks() {
        return handle;
    }
    let success = options.success.clone();
    let error = options.error.clone();

    let (tx, forwarded) = JobHandle::channel(handle.id());
    tokio::spawn(async move {
        let result: SyncResult<Value> = handle.await;
        match &result {
            Ok(value) => {
                if let Some(success) = &success {
                    success(value);
                }
            }
            Err(err) => {
                if let Some(error) = &error {
                    error(err);
                }
            }
        }
        let _ = tx.send(result);
    });
    forwarded
}
