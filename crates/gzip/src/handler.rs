use crate::body::Body;
use async_trait::async_trait;
use http::{Request, Response};
use std::sync::Arc;

/// An asynchronous request handler, the unit the gzip middleware decorates.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: Request<Body>) -> Response<Body>;
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Box<H> {
    async fn invoke(&self, req: Request<Body>) -> Response<Body> {
        (**self).invoke(req).await
    }
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    async fn invoke(&self, req: Request<Body>) -> Response<Body> {
        (**self).invoke(req).await
    }
}

/// A [`RequestHandler`] calling an async function.
#[derive(Debug, Clone)]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send,
{
    async fn invoke(&self, req: Request<Body>) -> Response<Body> {
        (self.f)(req).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send,
{
    FnHandler { f }
}
