//! End-to-end reads through the adapter against local repositories.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use gitrecords::handle::{CacheRoot, LocalConnector};
use gitrecords::storage::{Commit, GitObject, GitStore, ObjectId, ObjectStore, PathEntry, Signature};
use gitrecords::sync::{Adapter, Method, Model, SyncError, SyncOptions};

async fn commit(store: &GitStore, branch: &str, files: &[(&str, &str)]) -> ObjectId {
    let ref_name = format!("refs/heads/{branch}");
    let entries = files.iter().map(|(path, body)| PathEntry::blob(*path, *body)).collect();
    let tree = store.create_tree(None, entries).await.unwrap();
    let commit = Commit::new(tree, vec![], Signature::gitrecords(), format!("seed {branch}"));
    let id = store.save(&GitObject::Commit(commit)).await.unwrap();
    store.update_ref(&ref_name, &id).await.unwrap();
    id
}

fn local_adapter(root: &Path, cache: CacheRoot) -> Adapter {
    let defaults = SyncOptions::new().with_credential("local");
    Adapter::with_parts(defaults, Arc::new(LocalConnector::new(root)), cache).unwrap()
}

#[tokio::test]
async fn reads_the_branch_named_in_the_address() {
    let root = TempDir::new().unwrap();
    let repo = GitStore::init(root.path().join("acme/widgets")).unwrap();
    commit(&repo, "master", &[("todos/a.json", r#"{"id":"a","branch":"master"}"#)]).await;
    commit(
        &repo,
        "dev",
        &[
            ("todos/a.json", r#"{"id":"a","branch":"dev"}"#),
            ("todos/b.json", r#"{"id":"b","branch":"dev"}"#),
        ],
    )
    .await;

    let adapter = local_adapter(root.path(), CacheRoot::in_memory());
    let todos = Model::collection("https://github.com/acme/widgets/tree/dev/todos");

    let all = adapter.read(todos.clone()).await.unwrap();
    assert_eq!(
        all,
        json!([
            {"id": "a", "branch": "dev"},
            {"id": "b", "branch": "dev"}
        ])
    );

    let one = adapter.read(Model::record("b", todos)).await.unwrap();
    assert_eq!(one, json!({"id": "b", "branch": "dev"}));

    let master = adapter
        .read(Model::collection("https://github.com/acme/widgets/todos"))
        .await
        .unwrap();
    assert_eq!(master, json!([{"id": "a", "branch": "master"}]));
}

#[tokio::test]
async fn errors_keep_their_messages() {
    let root = TempDir::new().unwrap();
    let repo = GitStore::init(root.path().join("acme/widgets")).unwrap();
    commit(&repo, "master", &[("todos/a.json", "{}")]).await;

    let adapter = local_adapter(root.path(), CacheRoot::in_memory());
    let todos = Model::collection("https://github.com/acme/widgets/todos");

    let missing = adapter.read(Model::record("zz", todos.clone())).await.unwrap_err();
    assert_eq!(missing.to_string(), "model not found");

    let no_collection = adapter
        .read(Model::collection("https://github.com/acme/widgets/lists"))
        .await
        .unwrap_err();
    assert_eq!(no_collection.to_string(), "Collection not found");

    let create = adapter.sync(Method::Create, todos, SyncOptions::new()).await.unwrap_err();
    assert_eq!(create.to_string(), "Only \"read\" supported at this stage");

    let unknown_repo = adapter
        .read(Model::collection("https://github.com/acme/gadgets/todos"))
        .await
        .unwrap_err();
    assert!(matches!(unknown_repo, SyncError::Storage(ref err) if err.is_not_found()));
}

#[tokio::test]
async fn callbacks_fire_once_per_call() {
    let root = TempDir::new().unwrap();
    let repo = GitStore::init(root.path().join("acme/widgets")).unwrap();
    commit(&repo, "master", &[("todos/a.json", "{}"), ("todos/b.json", "{}")]).await;

    let adapter = local_adapter(root.path(), CacheRoot::in_memory());
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    let options = SyncOptions::new().on_success(move |value: &Value| {
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let todos = Model::collection("https://github.com/acme/widgets/todos");
    adapter.sync(Method::Read, todos, options).await.unwrap();
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disk_cache_is_filled_by_reads() {
    let root = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let repo = GitStore::init(root.path().join("acme/widgets")).unwrap();
    let head = commit(&repo, "master", &[("todos/a.json", r#"{"id":"a"}"#)]).await;

    let adapter = local_adapter(root.path(), CacheRoot::on_disk(cache_dir.path()));
    let value = adapter
        .read(Model::record("a", Model::collection("https://github.com/acme/widgets/todos")))
        .await
        .unwrap();
    assert_eq!(value, json!({"id": "a"}));

    let namespace = cache_dir.path().join("acme/widgets");
    assert!(namespace.join("commit").join(head.as_str()).exists());
    assert!(namespace.join("refs/heads/master").exists());
}
