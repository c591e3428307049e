//! GitHub remote store.
//!
//! Talks to the Git Data REST API (`/repos/{owner}/{repo}/git/...`) so that
//! reads and writes work object by object, without a clone.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::ObjectStore;
use crate::storage::types::{
    Commit, Credential, EntryMode, GitObject, ObjectId, ObjectKind, RepoId, Signature, Tree, TreeEntry,
};

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Object store backed by one GitHub repository.
#[derive(Clone)]
pub struct GithubStore {
    client: Client,
    api_url: String,
    repo: RepoId,
    credential: Credential,
}

impl GithubStore {
    /// Create a store for `repo` against the public API.
    pub fn new(repo: RepoId, credential: Credential) -> StorageResult<Self> {
        Ok(Self::with_client(build_client()?, DEFAULT_API_URL, repo, credential))
    }

    /// Create a store with a shared client and custom API root (GitHub Enterprise).
    pub fn with_client(client: Client, api_url: impl Into<String>, repo: RepoId, credential: Credential) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repo,
            credential,
        }
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/{}",
            self.api_url,
            self.repo.owner(),
            self.repo.name(),
            path
        )
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.credential.expose()))
    }

    /// GET a JSON document, `None` when the remote says it doesn't exist
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> StorageResult<Option<T>> {
        debug!(repo = %self.repo, path, "GET");
        let resp = self.request(Method::GET, path).send().await?;
        let status = resp.status();
        // 409 is what an empty repository answers for every git endpoint
        if status == StatusCode::NOT_FOUND || status == StatusCode::CONFLICT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(http_error(resp).await);
        }
        Ok(Some(resp.json().await?))
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> StorageResult<T> {
        debug!(repo = %self.repo, path, %method, "send");
        let resp = self.request(method, path).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn exists(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<bool> {
        let resp = self
            .request(Method::GET, &format!("{}s/{}", kind, id))
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => Ok(false),
            _ => Err(http_error(resp).await),
        }
    }
}

#[async_trait]
impl ObjectStore for GithubStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        let not_found = || StorageError::ObjectNotFound(id.clone());
        match kind {
            ObjectKind::Blob => {
                let blob: BlobResponse = self.get_json(&format!("blobs/{id}")).await?.ok_or_else(not_found)?;
                Ok(GitObject::Blob(decode_blob(&blob)?))
            }
            ObjectKind::Tree => {
                let tree: TreeResponse = self.get_json(&format!("trees/{id}")).await?.ok_or_else(not_found)?;
                if tree.truncated {
                    warn!(repo = %self.repo, tree = %id, "tree listing truncated by the remote");
                }
                Ok(GitObject::Tree(tree_from_response(tree)?))
            }
            ObjectKind::Commit => {
                let commit: CommitResponse = self.get_json(&format!("commits/{id}")).await?.ok_or_else(not_found)?;
                Ok(GitObject::Commit(commit_from_response(commit)?))
            }
        }
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        let created: ShaRef = match object {
            GitObject::Blob(bytes) => {
                let body = BlobRequest {
                    content: STANDARD.encode(bytes),
                    encoding: "base64",
                };
                self.send_json(Method::POST, "blobs", &body).await?
            }
            GitObject::Tree(tree) => {
                let body = TreeRequest {
                    tree: tree
                        .iter()
                        .map(|(name, entry)| TreeItem {
                            path: name.to_string(),
                            mode: entry.mode.as_octal(),
                            kind: entry.mode.object_kind().to_string(),
                            sha: entry.hash.to_string(),
                        })
                        .collect(),
                };
                self.send_json(Method::POST, "trees", &body).await?
            }
            GitObject::Commit(commit) => {
                let body = CommitRequest {
                    message: &commit.message,
                    tree: commit.tree.as_str(),
                    parents: commit.parents.iter().map(ObjectId::as_str).collect(),
                    author: Person::from(&commit.author),
                    committer: Person::from(&commit.committer),
                };
                self.send_json(Method::POST, "commits", &body).await?
            }
        };
        Ok(ObjectId::from_hex(&created.sha)?)
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        let short = name
            .strip_prefix("refs/")
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))?;
        let reference: RefResponse = self
            .get_json(&format!("ref/{short}"))
            .await?
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))?;
        Ok(ObjectId::from_hex(&reference.object.sha)?)
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        let short = name
            .strip_prefix("refs/")
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))?;
        let update = RefUpdate {
            sha: id.as_str(),
            force: true,
        };
        let updated: StorageResult<RefResponse> =
            self.send_json(Method::PATCH, &format!("refs/{short}"), &update).await;

        let reference = match updated {
            Ok(reference) => reference,
            // the ref does not exist yet, create it
            Err(StorageError::Http { status: 422, .. }) | Err(StorageError::Http { status: 404, .. }) => {
                let create = RefCreate {
                    r#ref: name,
                    sha: id.as_str(),
                };
                self.send_json(Method::POST, "refs", &create).await?
            }
            Err(err) => return Err(err),
        };
        Ok(ObjectId::from_hex(&reference.object.sha)?)
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            if self.exists(kind, id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Build the HTTP client shared by every remote the process talks to.
pub fn build_client() -> StorageResult<Client> {
    Client::builder()
        .user_agent(concat!("gitrecords/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| StorageError::Transport(format!("failed to create HTTP client: {err}")))
}

async fn http_error(resp: reqwest::Response) -> StorageError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|err| err.message)
        .unwrap_or(body);
    StorageError::Http { status, message }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TreeItem {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaRef,
    #[serde(default)]
    parents: Vec<ShaRef>,
    author: Person,
    committer: Person,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Person {
    name: String,
    email: String,
    date: DateTime<Utc>,
}

impl From<&Signature> for Person {
    fn from(signature: &Signature) -> Self {
        Self {
            name: signature.name.clone(),
            email: signature.email.clone(),
            date: signature.time,
        }
    }
}

impl From<Person> for Signature {
    fn from(person: Person) -> Self {
        Self {
            name: person.name,
            email: person.email,
            time: person.date,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaRef,
}

#[derive(Serialize)]
struct BlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct TreeRequest {
    tree: Vec<TreeItem>,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
    author: Person,
    committer: Person,
}

#[derive(Serialize)]
struct RefUpdate<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct RefCreate<'a> {
    r#ref: &'a str,
    sha: &'a str,
}

fn decode_blob(blob: &BlobResponse) -> StorageResult<Vec<u8>> {
    match blob.encoding.as_str() {
        "base64" => {
            // the API wraps base64 content at 60 columns
            let compact: String = blob.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map_err(|err| StorageError::Serialization(format!("bad base64 blob: {err}")))
        }
        "utf-8" | "utf8" => Ok(blob.content.as_bytes().to_vec()),
        other => Err(StorageError::Serialization(format!("unknown blob encoding '{other}'"))),
    }
}

fn tree_from_response(resp: TreeResponse) -> StorageResult<Tree> {
    resp.tree
        .into_iter()
        .map(|item| {
            let mode = EntryMode::from_octal(&item.mode)
                .ok_or_else(|| StorageError::Serialization(format!("unknown mode '{}' for {}", item.mode, item.path)))?;
            Ok((item.path, TreeEntry::new(mode, ObjectId::from_hex(&item.sha)?)))
        })
        .collect()
}

fn commit_from_response(resp: CommitResponse) -> StorageResult<Commit> {
    Ok(Commit {
        tree: ObjectId::from_hex(&resp.tree.sha)?,
        parents: resp
            .parents
            .iter()
            .map(|parent| ObjectId::from_hex(&parent.sha))
            .collect::<Result<_, _>>()?,
        author: resp.author.into(),
        committer: resp.committer.into(),
        message: resp.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TREE_SHA: &str = "9fb037999f264ba9a7fc6274d15fa3ae2ab98312";
    const BLOB_SHA: &str = "3a0f86fb8db8eea7ccbb9a95f325ddbedfb25e15";

    #[test]
    fn test_decode_wrapped_base64_blob() {
        let blob: BlobResponse = serde_json::from_value(json!({
            "content": "eyJpZCI6ImEi\nfQ==\n",
            "encoding": "base64",
            "sha": BLOB_SHA,
            "size": 10
        }))
        .unwrap();
        assert_eq!(decode_blob(&blob).unwrap(), br#"{"id":"a"}"#.to_vec());
    }

    #[test]
    fn test_decode_unknown_encoding() {
        let blob = BlobResponse {
            content: String::new(),
            encoding: "rot13".into(),
        };
        assert!(matches!(decode_blob(&blob), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_tree_from_response() {
        let resp: TreeResponse = serde_json::from_value(json!({
            "sha": TREE_SHA,
            "tree": [
                {"path": "a.json", "mode": "100644", "type": "blob", "sha": BLOB_SHA, "size": 10},
                {"path": "todos", "mode": "040000", "type": "tree", "sha": TREE_SHA},
                {"path": "deploy.sh", "mode": "100755", "type": "blob", "sha": BLOB_SHA}
            ],
            "truncated": false
        }))
        .unwrap();

        let tree = tree_from_response(resp).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get("a.json").unwrap().mode, EntryMode::File);
        assert_eq!(tree.subtree("todos").unwrap().as_str(), TREE_SHA);
        assert_eq!(tree.get("deploy.sh").unwrap().mode, EntryMode::Exec);
    }

    #[test]
    fn test_commit_from_response() {
        let resp: CommitResponse = serde_json::from_value(json!({
            "sha": BLOB_SHA,
            "tree": {"sha": TREE_SHA, "url": "https://api.github.com/..."},
            "parents": [{"sha": BLOB_SHA}],
            "author": {"name": "Ada", "email": "ada@example.com", "date": "2014-02-27T15:05:06Z"},
            "committer": {"name": "Ada", "email": "ada@example.com", "date": "2014-02-27T15:05:06Z"},
            "message": "add todos"
        }))
        .unwrap();

        let commit = commit_from_response(resp).unwrap();
        assert_eq!(commit.tree.as_str(), TREE_SHA);
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.author.name, "Ada");
        assert_eq!(commit.author.time.to_rfc3339(), "2014-02-27T15:05:06+00:00");
    }

    #[test]
    fn test_tree_request_shape() {
        let item = TreeItem {
            path: "a.json".into(),
            mode: EntryMode::File.as_octal(),
            kind: EntryMode::File.object_kind().to_string(),
            sha: BLOB_SHA.into(),
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value, json!({"path": "a.json", "mode": "100644", "type": "blob", "sha": BLOB_SHA}));
    }

    #[test]
    fn test_urls() {
        let store = GithubStore::with_client(
            Client::new(),
            "https://github.example.com/api/v3/",
            RepoId::parse("acme/widgets").unwrap(),
            Credential::new("t"),
        );
        assert_eq!(
            store.url("ref/heads/dev"),
            "https://github.example.com/api/v3/repos/acme/widgets/git/ref/heads/dev"
        );
    }
}
