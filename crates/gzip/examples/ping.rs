use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use http::{Request, Response};
use http_body_util::BodyExt;
use micro_gzip::{Body, CompressionLevel, Decorator, GzipDecorator, GzipOptions, RequestHandler, handler_fn};
use std::error::Error;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

async fn ping(_req: Request<Body>) -> Response<Body> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    Response::new(Body::from(format!("pong {now}")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = GzipOptions::builder().min_length(0).build()?;
    let handler = GzipDecorator::new(CompressionLevel::DEFAULT_COMPRESSION, options).decorate(handler_fn(ping));

    let req = Request::get("/ping").header(ACCEPT_ENCODING, "gzip").body(Body::empty())?;
    let resp = handler.invoke(req).await;
    info!(status = %resp.status(), headers = ?resp.headers(), "got response");

    let compressed = resp.headers().contains_key(CONTENT_ENCODING);
    let bytes = resp.into_body().collect().await?.to_bytes();

    let body = if compressed {
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&bytes[..]).read_to_string(&mut decoded)?;
        decoded
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    info!(compressed_len = bytes.len(), body = %body, "read body");

    Ok(())
}
