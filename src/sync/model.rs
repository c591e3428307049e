//! Models as seen by the adapter.
//!
//! A model is either a collection (it has a url and no parent) or a record
//! inside one (it has an id and a back-reference to its collection).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::sync::options::SyncOptions;

/// Receives model events. The adapter emits `"request"` before a read is
/// resolved.
pub trait ModelEvents: Send + Sync {
    fn trigger(&self, event: &str, model: &Model, data: Option<&Value>, options: &SyncOptions);
}

#[derive(Clone, Default)]
pub struct Model {
    id: Option<String>,
    url: Option<String>,
    collection: Option<Arc<Model>>,
    options: SyncOptions,
    events: Option<Arc<dyn ModelEvents>>,
}

impl Model {
    /// A collection living at `url`.
    pub fn collection(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// The record `id` of `collection`.
    pub fn record(id: impl Into<String>, collection: impl Into<Arc<Model>>) -> Self {
        Self {
            id: Some(id.into()),
            collection: Some(collection.into()),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn ModelEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// the parent collection, for a record
    pub fn parent(&self) -> Option<&Arc<Model>> {
        self.collection.as_ref()
    }

    pub fn is_record(&self) -> bool {
        self.collection.is_some()
    }

    /// model-level option overrides
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn events(&self) -> Option<&Arc<dyn ModelEvents>> {
        self.events.as_ref()
    }

    /// The model's address: its own url, or `<collection url>/<id>`.
    pub fn url(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }
        let base = self.collection.as_ref()?.url()?;
        match &self.id {
            Some(id) => Some(format!("{}/{}", base.trim_end_matches('/'), id)),
            None => Some(base),
        }
    }

    pub(crate) fn trigger(&self, event: &str, data: Option<&Value>, options: &SyncOptions) {
        if let Some(events) = &self.events {
            events.trigger(event, self, data, options);
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("collection", &self.collection.as_ref().and_then(|parent| parent.url()))
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ModelEvents for Recorder {
        fn trigger(&self, event: &str, model: &Model, data: Option<&Value>, _options: &SyncOptions) {
            assert!(data.is_none());
            self.seen.lock().push((event.to_string(), model.url()));
        }
    }

    #[test]
    fn test_record_url_derives_from_collection() {
        let todos = Arc::new(Model::collection("https://github.com/acme/widgets/tree/dev/todos"));
        let record = Model::record("a", todos.clone());

        assert!(record.is_record());
        assert!(!todos.is_record());
        assert_eq!(
            record.url().as_deref(),
            Some("https://github.com/acme/widgets/tree/dev/todos/a")
        );
        assert_eq!(Model::default().url(), None);
    }

    #[test]
    fn test_trigger_reaches_event_sink() {
        let recorder = Arc::new(Recorder::default());
        let model = Model::collection("https://github.com/acme/widgets/todos").with_events(recorder.clone());

        model.trigger("request", None, &SyncOptions::default());
        Model::record("a", model.clone()).trigger("request", None, &SyncOptions::default());

        let seen = recorder.seen.lock();
        assert_eq!(
            *seen,
            vec![("request".to_string(), Some("https://github.com/acme/widgets/todos".to_string()))]
        );
    }
}
