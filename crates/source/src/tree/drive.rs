//! Google Drive source tree.
//!
//! Talks to the Drive v3 REST API directly. Authentication is somebody
//! else's problem: the tree is handed an OAuth access token that is already
//! valid for the `drive.readonly` scope.
//!
//! Downloads are made of sequential `Range` requests of at most `chunk_size`
//! bytes each; Drive is much happier with small ranged reads than with one
//! multi-gigabyte response over a flaky connection.

use crate::error::{ErrorKind, Result};
use crate::tree::ChunkStream;
use crate::{NodeId, SourceNode, SourceTree};
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use exn::ResultExt;
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size)";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// int64 values are serialized as strings by the Drive API.
    size: Option<String>,
}
impl DriveFile {
    fn into_node(self, parent: &NodeId) -> SourceNode {
        let parent = Some(parent.clone());
        match self.mime_type.as_str() {
            FOLDER_MIME_TYPE => SourceNode::container(self.id, self.name, parent),
            _ => {
                let size = self.size.and_then(|s| s.parse().ok());
                SourceNode::leaf(self.id, self.name, parent, size)
            },
        }
    }
}

/// Google Drive source tree.
///
/// # Examples
///
/// ```no_run
/// use ferry_source::tree::DriveTree;
/// use std::time::Duration;
///
/// # fn example() -> ferry_source::error::Result<()> {
/// let tree = DriveTree::new("drive", "10j7Z3ySuFNgzVwEXE16TDXWBWHNh8UO2", "ya29.token", Duration::from_secs(120))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DriveTree {
    name: String,
    root: NodeId,
    access_token: String,
    api_url: String,
    timeout: Duration,
    /// Shared client for metadata requests only. Downloads get their own.
    client: Client,
}

impl fmt::Debug for DriveTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveTree")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("access_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DriveTree {
    /// Create a tree rooted at the Drive folder `root_folder_id`.
    ///
    /// `timeout` applies to every individual HTTP request.
    pub fn new(
        name: impl Into<String>,
        root_folder_id: impl Into<NodeId>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            root: root_folder_id.into(),
            access_token: access_token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout,
            client: Self::build_client(timeout)?,
        })
    }

    /// Point the tree at a different API endpoint (proxies, test servers).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_client(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network("cannot build HTTP client".to_string()))
    }

    /// Search query selecting the live children of a folder.
    fn children_query(container: &NodeId) -> String {
        format!("'{}' in parents and trashed=false", container.as_str().replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn map_status(status: StatusCode, body: &str, id: &NodeId) -> ErrorKind {
        match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound(id.to_string()),
            // Drive reports quota exhaustion as 403 as well, with a
            // `rateLimitExceeded` or `userRateLimitExceeded` reason.
            StatusCode::FORBIDDEN if body.to_ascii_lowercase().contains("ratelimitexceeded") => {
                ErrorKind::Network(format!("rate limited while fetching {id}"))
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Unauthorized(format!("{id}: HTTP {status}")),
            _ => ErrorKind::Network(format!("{id}: HTTP {status}: {body}")),
        }
    }

    async fn check_status(response: Response, id: &NodeId) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        exn::bail!(Self::map_status(status, &body, id))
    }

    async fn list_page(&self, container: &NodeId, page_token: Option<&str>) -> Result<FileList> {
        let mut query = vec![
            ("q", Self::children_query(container)),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let response = self
            .client
            .get(format!("{}/files", self.api_url))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("listing {container}")))?;
        let response = Self::check_status(response, container).await?;
        response.json().await.or_raise(|| ErrorKind::InvalidResponse(format!("listing {container}")))
    }

    /// A ranged read must be answered with 206, unless the range happens to
    /// be the whole file. Anything else would splice the full body into the
    /// middle of the staging file.
    fn check_partial(status: StatusCode, id: &NodeId, start: u64, end: u64, total: u64) -> Result<()> {
        let whole_file = start == 0 && end + 1 == total;
        if status == StatusCode::PARTIAL_CONTENT || (status == StatusCode::OK && whole_file) {
            return Ok(());
        }
        exn::bail!(ErrorKind::InvalidResponse(format!("range {start}-{end} of {id} answered with HTTP {status}")))
    }

    /// Fetch one inclusive byte range of a leaf of `total` bytes.
    async fn fetch_range(
        client: &Client,
        url: &str,
        token: &str,
        id: &NodeId,
        (start, end, total): (u64, u64, u64),
    ) -> Result<Bytes> {
        let response = client
            .get(url)
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("downloading {id} [{start}-{end}]")))?;
        let response = Self::check_status(response, id).await?;
        Self::check_partial(response.status(), id, start, end, total)?;
        let bytes = response.bytes().await.or_raise(|| ErrorKind::Network(format!("reading {id} [{start}-{end}]")))?;
        if bytes.is_empty() {
            exn::bail!(ErrorKind::InvalidResponse(format!("empty range {start}-{end} for {id}")));
        }
        Ok(bytes)
    }

    /// Fetch a leaf of unknown size in one streamed response.
    async fn fetch_whole(client: &Client, url: &str, token: &str, id: &NodeId) -> Result<Response> {
        let response = client
            .get(url)
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("downloading {id}")))?;
        Self::check_status(response, id).await
    }
}

#[async_trait]
impl SourceTree for DriveTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> NodeId {
        self.root.clone()
    }

    async fn list_children(&self, container: &NodeId) -> Result<Vec<SourceNode>> {
        let mut children = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(container, page_token.as_deref()).await?;
            children.extend(page.files.into_iter().map(|file| file.into_node(container)));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        tracing::trace!(source = %self.name, %container, children = children.len(), "Listed Drive folder");
        Ok(children)
    }

    async fn open(&self, leaf: &SourceNode, chunk_size: usize) -> Result<ChunkStream> {
        if !leaf.is_leaf() {
            exn::bail!(ErrorKind::NotALeaf(leaf.id.to_string()));
        }
        // A dedicated client per call: a restarted download must never
        // inherit a pooled connection from the attempt that just broke.
        let client = Self::build_client(self.timeout)?;
        let url = format!("{}/files/{}", self.api_url, leaf.id);
        let token = self.access_token.clone();
        let id = leaf.id.clone();
        let chunk_size = chunk_size.max(1) as u64;

        let stream = match leaf.size {
            Some(total) if total > 0 => Box::pin(stream! {
                let mut offset = 0u64;
                while offset < total {
                    let end = (offset + chunk_size).min(total) - 1;
                    match Self::fetch_range(&client, &url, &token, &id, (offset, end, total)).await {
                        Ok(bytes) => {
                            offset += bytes.len() as u64;
                            yield Ok(bytes);
                        },
                        Err(e) => {
                            yield Err(e);
                            break;
                        },
                    }
                }
            }) as ChunkStream,
            // Size unknown (or zero): a ranged request could be rejected
            // with 416, so take whatever the server sends.
            _ => Box::pin(stream! {
                let mut body = match Self::fetch_whole(&client, &url, &token, &id).await {
                    Ok(response) => response.bytes_stream(),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for piece in bytes.chunks(chunk_size as usize) {
                                yield Ok(bytes.slice_ref(piece));
                            }
                        },
                        Err(e) => {
                            yield Err(exn::Exn::from(ErrorKind::Network(format!("reading {id}: {e}"))));
                            break;
                        },
                    }
                }
            }) as ChunkStream,
        };
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_file_list() {
        let json = r#"{
            "nextPageToken": "abc",
            "files": [
                {"id": "f1", "name": "200", "mimeType": "application/vnd.google-apps.folder"},
                {"id": "f2", "name": "vid1.mp4", "mimeType": "video/mp4", "size": "1048576"},
                {"id": "f3", "name": "doc", "mimeType": "application/vnd.google-apps.document"}
            ]
        }"#;
        let list: FileList = serde_json::from_str(json).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("abc"));
        let parent = NodeId::from("root");
        let nodes: Vec<_> = list.files.into_iter().map(|f| f.into_node(&parent)).collect();
        assert!(nodes[0].is_container());
        assert!(nodes[1].is_leaf());
        assert_eq!(nodes[1].size, Some(1_048_576));
        assert_eq!(nodes[1].parent, Some(parent));
        assert_eq!(nodes[2].size, None);
    }

    #[test]
    fn test_parse_empty_last_page() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn test_children_query_escapes_quotes() {
        assert_eq!(DriveTree::children_query(&NodeId::from("1aB")), "'1aB' in parents and trashed=false");
        assert_eq!(DriveTree::children_query(&NodeId::from("it's")), r"'it\'s' in parents and trashed=false");
    }

    #[rstest]
    #[case(StatusCode::NOT_FOUND, "", "node not found")]
    #[case(StatusCode::UNAUTHORIZED, "", "unauthorized")]
    #[case(StatusCode::FORBIDDEN, "insufficientPermissions", "unauthorized")]
    #[case(StatusCode::FORBIDDEN, r#"{"reason": "userRateLimitExceeded"}"#, "network")]
    #[case(StatusCode::FORBIDDEN, r#"{"reason": "rateLimitExceeded"}"#, "network")]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, "oops", "network")]
    fn test_map_status(#[case] status: StatusCode, #[case] body: &str, #[case] expected: &str) {
        let kind = DriveTree::map_status(status, body, &NodeId::from("f1"));
        assert!(kind.to_string().starts_with(expected), "{kind}");
    }

    #[rstest]
    #[case(StatusCode::PARTIAL_CONTENT, 0, 3, 10, true)]
    #[case(StatusCode::PARTIAL_CONTENT, 4, 7, 10, true)]
    #[case(StatusCode::OK, 0, 9, 10, true)]
    #[case(StatusCode::OK, 0, 3, 10, false)]
    #[case(StatusCode::OK, 4, 7, 10, false)]
    fn test_check_partial(
        #[case] status: StatusCode,
        #[case] start: u64,
        #[case] end: u64,
        #[case] total: u64,
        #[case] accepted: bool,
    ) {
        let result = DriveTree::check_partial(status, &NodeId::from("f1"), start, end, total);
        assert_eq!(result.is_ok(), accepted);
        if let Err(err) = result {
            assert!(matches!(&*err, ErrorKind::InvalidResponse(_)));
        }
    }

    #[test]
    fn test_debug_hides_token() {
        let tree = DriveTree::new("drive", "root", "ya29.secret", Duration::from_secs(5)).unwrap();
        let printed = format!("{tree:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("ya29.secret"));
    }

    #[test]
    fn test_with_api_url_trims_slash() {
        let tree = DriveTree::new("drive", "root", "token", Duration::from_secs(5))
            .unwrap()
            .with_api_url("http://localhost:8080/drive/v3/");
        assert_eq!(tree.api_url, "http://localhost:8080/drive/v3");
        assert_eq!(tree.root(), NodeId::from("root"));
    }
}
