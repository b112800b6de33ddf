//! Serve [`bramble`] request handlers with hyper.
//!
//! Each hyper request is converted into a [`bramble::Request`], the handler
//! runs with it published as the current request, and once the response
//! is ready the request's default futures are executed in the background.

use std::convert::Infallible;
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bramble::http::{Bytes, Payload};
use bramble::{Config, FutureRegistry, Request};
use hyper::service::Service;
use hyper::{Body, Response};

/// Convert a hyper request into a [`Request`].
pub fn convert(
    req: hyper::Request<Body>,
    config: &Config,
    registry: &Arc<FutureRegistry>,
) -> Request {
    let (parts, body) = req.into_parts();

    let mut headers: Vec<(Bytes, Bytes)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                Bytes::copy_from_slice(name.as_str().as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
            )
        })
        .collect();

    // http/2 carries the host in the uri authority
    if !parts.headers.contains_key(hyper::header::HOST) {
        if let Some(authority) = parts.uri.authority() {
            headers.push((
                Bytes::from_static(b"host"),
                Bytes::copy_from_slice(authority.as_str().as_bytes()),
            ));
        }
    }

    let payload = if body_is_empty(&parts.headers, &parts.method) {
        Payload::empty()
    } else {
        Payload::stream(body)
    };

    Request::builder()
        .config(config)
        .registry(registry.clone())
        .scheme(parts.uri.scheme_str().unwrap_or("http"))
        .method(parts.method.as_str())
        .path(parts.uri.path())
        .query_string(Bytes::copy_from_slice(
            parts.uri.query().unwrap_or_default().as_bytes(),
        ))
        .headers(headers)
        .version(parts.version.into())
        .payload(payload)
        .build()
}

fn body_is_empty(headers: &hyper::HeaderMap, method: &hyper::Method) -> bool {
    let has_length = headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|len| len.to_str().ok())
        .map(|len| len.trim() != "0");

    match has_length {
        Some(has_body) => !has_body,
        None => {
            !headers.contains_key(hyper::header::TRANSFER_ENCODING)
                && matches!(
                    *method,
                    hyper::Method::GET | hyper::Method::HEAD | hyper::Method::OPTIONS
                )
        }
    }
}

/// A hyper [`Service`] running a request handler.
pub struct BrambleService<H> {
    handler: Arc<H>,
    config: Arc<Config>,
    registry: Arc<FutureRegistry>,
}

impl<H, Fut> BrambleService<H>
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    pub fn new(handler: H) -> Self {
        BrambleService::with_config(handler, Config::default())
    }

    pub fn with_config(handler: H, config: Config) -> Self {
        BrambleService {
            handler: Arc::new(handler),
            config: Arc::new(config),
            registry: Arc::new(FutureRegistry::new()),
        }
    }

    /// The registry shared by every request this service handles.
    pub fn registry(&self) -> &Arc<FutureRegistry> {
        &self.registry
    }

    pub fn into_make_service(self) -> BrambleMakeService<H> {
        BrambleMakeService { service: self }
    }
}

impl<H, Fut> Service<hyper::Request<Body>> for BrambleService<H>
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: hyper::Request<Body>) -> Self::Future {
        let request = convert(req, &self.config, &self.registry);
        let handler = self.handler.clone();

        Box::pin(async move {
            let resp = request.clone().scope(handler(request.clone())).await;

            if let Err(err) = request.execute_default_futures() {
                tracing::warn!(error = %err, "failed to execute deferred futures");
            }

            Ok(resp)
        })
    }
}

impl<H> Clone for BrambleService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
        }
    }
}

pub struct BrambleMakeService<H> {
    service: BrambleService<H>,
}

impl<T, H> Service<T> for BrambleMakeService<H> {
    type Response = BrambleService<H>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: T) -> Self::Future {
        ready(Ok(self.service.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn converts_request() {
        let req = hyper::Request::post("http://example.com/items?page=2")
            .header("x-forwarded-request-uid", "abc-123")
            .header("content-length", "5")
            .body(Body::from("hello"))
            .unwrap();

        let registry = Arc::new(FutureRegistry::new());
        let request = convert(req, &Config::default(), &registry);

        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/items");
        assert_eq!(request.query_string(), "page=2");
        assert_eq!(request.host(), Some("example.com"));
        assert_eq!(request.uid(), "abc-123");
        assert!(request.body_exists());
        assert_eq!(request.read().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn get_without_length_has_no_body() {
        let req = hyper::Request::get("/").body(Body::empty()).unwrap();
        let request = convert(req, &Config::default(), &Arc::new(FutureRegistry::new()));
        assert!(!request.body_exists());
    }

    #[tokio::test]
    async fn runs_default_futures_after_handler() {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));

        let mut service = BrambleService::new(move |request: Request| {
            let tx = tx.lock().unwrap().take();
            async move {
                let current = bramble::current().unwrap();
                assert_eq!(current, request);

                current.add_future("notify", bramble::DEFAULT_SCOPE, move |req: Request| async move {
                    if let Some(tx) = tx {
                        let _ = tx.send(req.path().to_owned());
                    }
                    Ok::<_, std::io::Error>(())
                });

                Response::new(Body::from("done"))
            }
        });

        let req = hyper::Request::get("/audit").body(Body::empty()).unwrap();
        let resp = service.call(req).await.unwrap();

        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "done");
        assert_eq!(rx.await.unwrap(), "/audit");
    }
}
