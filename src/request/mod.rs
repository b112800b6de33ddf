mod body;
mod state;

pub use state::StateValue;

pub(crate) use body::Charset;

use crate::bounded::BoxError;
use crate::config::Config;
use crate::deferred::{Execution, FutureInfo, FutureRegistry, DEFAULT_SCOPE};
use crate::error::{FutureError, WsError};
use crate::http::{ByteStr, Bytes, Method, MultiMap, Payload, Version};
use crate::memo::Memo;
use crate::ws::{WebSocket, WsTransport};

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// One inbound HTTP or WebSocket interaction.
///
/// A `Request` is a cheap handle: clones refer to the same underlying
/// request, and two handles compare equal only if they do. Derived views
/// such as [`headers`](Request::headers) or [`url`](Request::url) are
/// computed on first access and never change afterwards.
#[derive(Clone)]
pub struct Request {
    shared: Arc<Shared>,
}

struct Shared {
    key: u64,
    initialized_at: SystemTime,

    scheme: String,
    raw_method: String,
    raw_path: String,
    raw_query: Bytes,
    raw_headers: Vec<(Bytes, Bytes)>,
    version: Version,
    client_max_size: usize,
    default_charset: String,
    uid_header: String,
    trust_forwarded_uid: bool,
    runtime: Option<Handle>,
    registry: Arc<FutureRegistry>,
    payload: Payload,
    socket: Mutex<Option<WsTransport>>,
    socket_offered: bool,
    cancel: CancellationToken,

    uid: Memo<String>,
    method: Memo<Method>,
    headers: Memo<MultiMap>,
    query: Memo<MultiMap>,
    query_string: Memo<String>,
    host: Memo<Option<String>>,
    url: Memo<Option<Url>>,
    rel_url: Memo<String>,
    content_type: Memo<Option<mime::Mime>>,

    state: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    events: Mutex<Vec<(String, SystemTime)>>,
    body: tokio::sync::OnceCell<Bytes>,
    body_spoiled: AtomicBool,
    charset: Mutex<Option<String>>,
    view: Mutex<View>,
    matchdict: Mutex<HashMap<String, String>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let discarded = self.registry.discard(self.key);
        if discarded > 0 {
            tracing::debug!(discarded, "dropped request with pending deferred futures");
        }
    }
}

/// View resolution results, written by the dispatch layer.
#[derive(Clone, Default)]
pub struct View {
    pub view_name: Option<String>,
    pub found_view: Option<String>,
    pub exc: Option<Arc<dyn StdError + Send + Sync>>,
    pub view_error: bool,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("view_name", &self.view_name)
            .field("found_view", &self.found_view)
            .field("exc", &self.exc.as_ref().map(|e| e.to_string()))
            .field("view_error", &self.view_error)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

impl Request {
    /// Create a [`RequestBuilder`].
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub(crate) fn key(&self) -> u64 {
        self.shared.key
    }

    /// The identity of this request.
    ///
    /// Taken from the forwarded request id header when present and
    /// trusted, otherwise freshly generated. Assigned once.
    pub fn uid(&self) -> &str {
        self.shared.uid.get_or_init(|| {
            if self.shared.trust_forwarded_uid {
                if let Some(uid) = self.headers().get(&self.shared.uid_header) {
                    return uid.to_owned();
                }
            }

            Uuid::new_v4().simple().to_string()
        })
    }

    pub fn scheme(&self) -> &str {
        &self.shared.scheme
    }

    /// The request method, upper-cased.
    pub fn method(&self) -> &Method {
        self.shared
            .method
            .get_or_init(|| Method::parse(&self.shared.raw_method))
    }

    pub fn version(&self) -> Version {
        self.shared.version
    }

    /// The raw path, without the query string.
    pub fn path(&self) -> &str {
        &self.shared.raw_path
    }

    /// The value of the `host` header.
    pub fn host(&self) -> Option<&str> {
        self.shared
            .host
            .get_or_init(|| self.headers().get("host").map(str::to_owned))
            .as_deref()
    }

    /// The path and query string, e.g. `/app/blog?id=10`.
    pub fn rel_url(&self) -> &str {
        self.shared.rel_url.get_or_init(|| {
            let query = self.query_string();
            if query.is_empty() {
                self.path().to_owned()
            } else {
                format!("{}?{}", self.path(), query)
            }
        })
    }

    /// The absolute URL, built from the scheme, the host and
    /// [`rel_url`](Request::rel_url).
    ///
    /// Returns `None` if the request has no usable host.
    pub fn url(&self) -> Option<&Url> {
        self.shared
            .url
            .get_or_init(|| {
                let host = self.host()?;
                let base = format!("{}://{}", self.scheme(), host);

                match Url::parse(&base).and_then(|base| base.join(self.rel_url())) {
                    Ok(url) => Some(url),
                    Err(err) => {
                        tracing::warn!(host = %host, error = %err, "cannot build request url");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// The decoded query string, e.g. `id=10`.
    pub fn query_string(&self) -> &str {
        self.shared
            .query_string
            .get_or_init(|| String::from_utf8_lossy(&self.shared.raw_query).into_owned())
    }

    pub fn raw_query_string(&self) -> &[u8] {
        &self.shared.raw_query
    }

    /// The query parameters, as a case-insensitive multi-valued map.
    ///
    /// Parameters with blank values are dropped.
    pub fn query(&self) -> &MultiMap {
        self.shared.query.get_or_init(|| {
            match serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.shared.raw_query) {
                Ok(pairs) => pairs
                    .into_iter()
                    .filter(|(_, value)| !value.is_empty())
                    .collect(),
                Err(err) => {
                    tracing::warn!(error = %err, "malformed query string");
                    MultiMap::new()
                }
            }
        })
    }

    /// The request headers, as a case-insensitive multi-valued map.
    pub fn headers(&self) -> &MultiMap {
        self.shared.headers.get_or_init(|| {
            tracing::trace!(count = self.shared.raw_headers.len(), "parsing request headers");

            let mut headers = MultiMap::with_capacity(self.shared.raw_headers.len());
            for (name, value) in &self.shared.raw_headers {
                headers.append(
                    ByteStr::from_utf8_lossy(name.clone()),
                    ByteStr::from_utf8_lossy(value.clone()),
                );
            }
            headers
        })
    }

    /// The header pairs exactly as the transport supplied them.
    pub fn raw_headers(&self) -> &[(Bytes, Bytes)] {
        &self.shared.raw_headers
    }

    /// The parsed `content-type` header.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.shared
            .content_type
            .get_or_init(|| self.headers().get("content-type")?.parse().ok())
            .as_ref()
    }

    /// The raw payload stream.
    pub fn content(&self) -> &Payload {
        &self.shared.payload
    }

    /// Returns `true` if the body has not been drained yet.
    pub fn can_read_body(&self) -> bool {
        !self.shared.payload.at_eof()
    }

    /// Returns `true` if the transport supplied a body at all.
    pub fn body_exists(&self) -> bool {
        self.shared.payload.exists()
    }

    /// The body ceiling in bytes; zero means unlimited.
    pub fn client_max_size(&self) -> usize {
        self.shared.client_max_size
    }

    /// The runtime deferred futures are spawned onto.
    pub fn runtime(&self) -> Option<&Handle> {
        self.shared.runtime.as_ref()
    }

    pub fn registry(&self) -> &Arc<FutureRegistry> {
        &self.shared.registry
    }

    pub fn initialized_at(&self) -> SystemTime {
        self.shared.initialized_at
    }

    /// Record the current time under `event_name`.
    ///
    /// Recording a name again updates its time but keeps its position.
    pub fn record(&self, event_name: impl Into<String>) {
        let name = event_name.into();
        let now = SystemTime::now();
        let mut events = lock(&self.shared.events);

        match events.iter_mut().find(|(n, _)| *n == name) {
            Some((_, at)) => *at = now,
            None => events.push((name, now)),
        }
    }

    /// The recorded events, in the order they were first recorded.
    pub fn events(&self) -> Vec<(String, SystemTime)> {
        lock(&self.shared.events).clone()
    }

    /// A snapshot of the view resolution fields.
    pub fn view(&self) -> View {
        lock(&self.shared.view).clone()
    }

    pub fn update_view<F>(&self, f: F)
    where
        F: FnOnce(&mut View),
    {
        f(&mut lock(&self.shared.view))
    }

    pub fn view_name(&self) -> Option<String> {
        lock(&self.shared.view).view_name.clone()
    }

    pub fn view_error(&self) -> bool {
        lock(&self.shared.view).view_error
    }

    /// The path parameters matched by the router.
    pub fn matchdict(&self) -> HashMap<String, String> {
        lock(&self.shared.matchdict).clone()
    }

    pub fn set_matchdict(&self, params: HashMap<String, String>) {
        *lock(&self.shared.matchdict) = params;
    }

    /// Signal that the client went away.
    ///
    /// Pending and future body reads fail with
    /// [`BodyError::Cancelled`](crate::error::BodyError::Cancelled).
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Build a WebSocket adapter over this request's socket.
    ///
    /// No handshake happens until [`WebSocket::prepare`]. The socket can
    /// only be claimed once.
    pub fn get_ws(&self) -> Result<WebSocket, WsError> {
        let mut socket = lock(&self.shared.socket);
        match socket.take() {
            Some(transport) => Ok(WebSocket::new(transport)),
            None if self.shared.socket_offered => Err(WsError::Taken),
            None => Err(WsError::Unavailable),
        }
    }

    /// Register work to run after this request has been handled.
    ///
    /// See [`FutureRegistry::add`].
    pub fn add_future<F, Fut, E>(&self, name: impl Into<String>, scope: &str, f: F)
    where
        F: FnOnce(Request) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.shared.registry.add(self, name, scope, f)
    }

    pub fn get_future(&self, name: &str, scope: &str) -> Result<FutureInfo, FutureError> {
        self.shared.registry.get(self, name, scope)
    }

    /// Run every entry registered in `scope`, concurrently, in a new task.
    pub fn execute_futures(&self, scope: &str) -> Result<Execution, FutureError> {
        self.shared.registry.execute(self, scope)
    }

    /// Run the entries of the default scope.
    pub fn execute_default_futures(&self) -> Result<Execution, FutureError> {
        self.execute_futures(DEFAULT_SCOPE)
    }

    /// Discard every pending entry of this request, in all scopes.
    ///
    /// Returns how many entries were discarded.
    pub fn clear_futures(&self) -> usize {
        self.shared.registry.clear(self)
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Request) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Request {}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Request {} {}>",
            self.method(),
            self.path().escape_debug()
        )
    }
}

/// Constructs a [`Request`] from the pieces a transport parsed.
pub struct RequestBuilder {
    scheme: String,
    method: String,
    path: String,
    query: Bytes,
    headers: Vec<(Bytes, Bytes)>,
    version: Version,
    payload: Payload,
    client_max_size: Option<usize>,
    config: Option<Config>,
    runtime: Option<Handle>,
    registry: Option<Arc<FutureRegistry>>,
    socket: Option<WsTransport>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        RequestBuilder {
            scheme: "http".to_owned(),
            method: "GET".to_owned(),
            path: "/".to_owned(),
            query: Bytes::new(),
            headers: Vec::new(),
            version: Version::default(),
            payload: Payload::empty(),
            client_max_size: None,
            config: None,
            runtime: None,
            registry: None,
            socket: None,
        }
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// The raw, still percent-encoded query string.
    pub fn query_string(mut self, query: impl Into<Bytes>) -> Self {
        self.query = query.into();
        self
    }

    /// Append one raw header pair.
    pub fn header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, N, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<Bytes>,
        V: Into<Bytes>,
    {
        self.headers
            .extend(headers.into_iter().map(|(n, v)| (n.into(), v.into())));
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Override the configured body ceiling. Zero disables it.
    pub fn client_max_size(mut self, size: usize) -> Self {
        self.client_max_size = Some(size);
        self
    }

    pub fn config(mut self, config: &Config) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// The runtime deferred futures are spawned onto.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// The registry deferred futures are stored in.
    ///
    /// Defaults to a registry private to this request.
    pub fn registry(mut self, registry: Arc<FutureRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The socket primitives a WebSocket adapter is later built from.
    pub fn socket(mut self, transport: WsTransport) -> Self {
        self.socket = Some(transport);
        self
    }

    pub fn build(self) -> Request {
        let config = self.config.unwrap_or_default();

        Request {
            shared: Arc::new(Shared {
                key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
                initialized_at: SystemTime::now(),
                scheme: self.scheme,
                raw_method: self.method,
                raw_path: self.path,
                raw_query: self.query,
                raw_headers: self.headers,
                version: self.version,
                client_max_size: self.client_max_size.unwrap_or(config.client_max_size),
                default_charset: config.default_charset,
                uid_header: config.uid_header,
                trust_forwarded_uid: config.trust_forwarded_uid,
                runtime: self.runtime.or_else(|| Handle::try_current().ok()),
                registry: self.registry.unwrap_or_default(),
                payload: self.payload,
                socket_offered: self.socket.is_some(),
                socket: Mutex::new(self.socket),
                cancel: CancellationToken::new(),
                uid: Memo::new(),
                method: Memo::new(),
                headers: Memo::new(),
                query: Memo::new(),
                query_string: Memo::new(),
                host: Memo::new(),
                url: Memo::new(),
                rel_url: Memo::new(),
                content_type: Memo::new(),
                state: Mutex::default(),
                events: Mutex::default(),
                body: tokio::sync::OnceCell::new(),
                body_spoiled: AtomicBool::new(false),
                charset: Mutex::default(),
                view: Mutex::default(),
                matchdict: Mutex::default(),
            }),
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
