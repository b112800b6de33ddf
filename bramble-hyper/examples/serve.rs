use std::net::SocketAddr;

use bramble::{current, Request, DEFAULT_SCOPE};
use bramble_hyper::BrambleService;
use hyper::{Body, Response, Server, StatusCode};

async fn echo(req: Request) -> Response<Body> {
    req.record("handler");

    let body = match req.text().await {
        Ok(body) => body,
        Err(err) => {
            return Response::builder()
                .status(err.status())
                .body(Body::from(err.to_string()))
                .unwrap()
        }
    };

    req.add_future("audit", DEFAULT_SCOPE, |req: Request| async move {
        tracing::info!(uid = %req.uid(), path = %req.path(), "audited request");
        Ok::<_, std::io::Error>(())
    });

    let name = current().and_then(|req| req.query().get("name").map(str::to_owned));

    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from(format!(
            "Hello {}! You sent {} bytes.",
            name.as_deref().unwrap_or("stranger"),
            body.len()
        )))
        .unwrap()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .init();

    let service = BrambleService::new(echo);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    Server::bind(&addr)
        .serve(service.into_make_service())
        .await
        .unwrap()
}
