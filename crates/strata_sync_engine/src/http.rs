//! Model service over a request/response link.
//!
//! Every operation is a POST of a canonical CBOR message to a fixed path
//! below the service URL, answered by a CBOR message. The link itself is the
//! [`HttpClient`] trait so that a real HTTP client, or the in-process
//! [`LoopbackClient`], can carry the bytes.

use crate::error::{SyncError, SyncResult};
use crate::transport::ProjectService;
use parking_lot::Mutex;
use strata_codec::CodecResult;
use strata_sync_protocol::{
    CommitRequest, CommitResponse, IdGrant, IdRequest, VersionFiles, VersionList,
    VersionListRequest, VersionQuery,
};
use tracing::{trace, warn};

/// Endpoint of id requests.
pub const IDS_PATH: &str = "/model/ids";
/// Endpoint of commits.
pub const COMMIT_PATH: &str = "/model/commit";
/// Endpoint of version file queries.
pub const FILES_PATH: &str = "/model/files";
/// Endpoint of version listings.
pub const VERSIONS_PATH: &str = "/model/versions";

/// Carries one POST to the service.
pub trait HttpClient: Send + Sync {
    /// Posts `body` to `url`, returning the response body or a description
    /// of the failure.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// A protocol message with a canonical CBOR form.
pub trait WireMessage: Sized {
    /// Encodes the message.
    fn to_wire(&self) -> CodecResult<Vec<u8>>;
    /// Decodes a message.
    fn from_wire(bytes: &[u8]) -> CodecResult<Self>;
}

macro_rules! wire_messages {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireMessage for $ty {
                fn to_wire(&self) -> CodecResult<Vec<u8>> {
                    self.encode()
                }

                fn from_wire(bytes: &[u8]) -> CodecResult<Self> {
                    <$ty>::decode(bytes)
                }
            }
        )*
    };
}

wire_messages!(
    IdRequest,
    IdGrant,
    CommitRequest,
    CommitResponse,
    VersionQuery,
    VersionFiles,
    VersionListRequest,
    VersionList,
);

#[derive(Debug)]
struct Link {
    up: bool,
    last_error: Option<String>,
    posts: u64,
}

/// [`ProjectService`] that posts CBOR messages through an [`HttpClient`].
///
/// A failed post marks the link down; later calls fail with
/// [`SyncError::NotConnected`] until [`reconnect`](Self::reconnect).
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    link: Mutex<Link>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            link: Mutex::new(Link {
                up: true,
                last_error: None,
                posts: 0,
            }),
        }
    }

    /// The service URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The failure that took the link down, if it is down.
    pub fn last_error(&self) -> Option<String> {
        self.link.lock().last_error.clone()
    }

    /// Number of posts handed to the client.
    pub fn posts(&self) -> u64 {
        self.link.lock().posts
    }

    /// Brings the link back up after a failure.
    pub fn reconnect(&self) {
        let mut link = self.link.lock();
        link.up = true;
        link.last_error = None;
    }

    fn exchange<Req: WireMessage, Res: WireMessage>(
        &self,
        path: &str,
        request: &Req,
    ) -> SyncResult<Res> {
        let body = request
            .to_wire()
            .map_err(|e| SyncError::Protocol(format!("cannot encode request for {path}: {e}")))?;

        {
            let mut link = self.link.lock();
            if !link.up {
                return Err(SyncError::NotConnected);
            }
            link.posts += 1;
        }

        let url = format!("{}{path}", self.base_url);
        trace!(%url, bytes = body.len(), "post");
        let reply = self.client.post(&url, body).map_err(|message| {
            warn!(%url, error = %message, "post failed, link down");
            let mut link = self.link.lock();
            link.up = false;
            link.last_error = Some(message.clone());
            SyncError::transport_retryable(message)
        })?;

        Res::from_wire(&reply)
            .map_err(|e| SyncError::Protocol(format!("bad reply from {path}: {e}")))
    }
}

impl<C: HttpClient> ProjectService for HttpTransport<C> {
    fn request_ids(&self, request: &IdRequest) -> SyncResult<IdGrant> {
        self.exchange(IDS_PATH, request)
    }

    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse> {
        self.exchange(COMMIT_PATH, request)
    }

    fn version_files(&self, query: &VersionQuery) -> SyncResult<VersionFiles> {
        self.exchange(FILES_PATH, query)
    }

    fn list_versions(&self, request: &VersionListRequest) -> SyncResult<VersionList> {
        self.exchange(VERSIONS_PATH, request)
    }

    fn is_connected(&self) -> bool {
        self.link.lock().up
    }
}

/// A service that answers posts in-process.
pub trait LoopbackServer {
    /// Answers a post to `path`, one of the endpoint constants.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_post(path, body)
    }
}

/// [`HttpClient`] that hands posts straight to a [`LoopbackServer`],
/// dropping the scheme and host of the URL.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Wraps `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// The wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = match url.rfind("/model/") {
            Some(start) => &url[start..],
            None => return Err(format!("no model endpoint in {url}")),
        };
        self.server.handle_post(path, &body)
    }
}
