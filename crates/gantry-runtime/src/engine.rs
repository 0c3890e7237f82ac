//! Engine adapter
//!
//! Converts hyper's requests into [`Context`] and finished responses back
//! into what hyper sends. Nothing above this module sees engine types.

use bytes::Bytes;
use gantry_core::{Body, Context, Error, Result};
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::net::SocketAddr;
use std::time::Duration;

/// Request-reading settings
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Max request body size (bytes)
    pub body_limit: usize,
    /// Deadline for reading the body
    pub read_timeout: Duration,
    /// Honour `X-Forwarded-*` headers
    pub trust_proxy: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            body_limit: 4 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            trust_proxy: false,
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read a request into a [`Context`]
///
/// Bodies larger than the limit fail with [`Error::BodyTooLarge`] (413),
/// before reading when `Content-Length` already says so.
pub async fn into_context<B>(
    req: Request<B>,
    remote_addr: Option<SocketAddr>,
    settings: &EngineSettings,
) -> Result<Context>
where
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = settings.body_limit;
    if content_length(req.headers()).is_some_and(|len| len > limit as u64) {
        return Err(Error::BodyTooLarge { limit });
    }

    let (parts, body) = req.into_parts();
    let collected = tokio::time::timeout(settings.read_timeout, Limited::new(body, limit).collect())
        .await
        .map_err(|_| Error::status(StatusCode::REQUEST_TIMEOUT, "Timed out reading request body"))?;

    let body = match collected {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(Error::BodyTooLarge { limit });
        }
        Err(e) => {
            return Err(Error::InvalidRequest(format!(
                "Failed to read request body: {e}"
            )));
        }
    };

    let mut ctx = Context::new(parts, body).with_trust_proxy(settings.trust_proxy);
    if let Some(addr) = remote_addr {
        ctx = ctx.with_remote_addr(addr);
    }
    Ok(ctx)
}

/// Final touches before a response goes back to the engine
pub fn finalize(mut response: Response<Body>, server_name: Option<&HeaderValue>) -> Response<Body> {
    if let Some(name) = server_name {
        response
            .headers_mut()
            .entry(header::SERVER)
            .or_insert_with(|| name.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn settings(limit: usize) -> EngineSettings {
        EngineSettings {
            body_limit: limit,
            ..Default::default()
        }
    }

    fn post() -> http::request::Builder {
        Request::builder().method("POST").uri("/upload?x=1")
    }

    #[tokio::test]
    async fn test_into_context() {
        let req = post()
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Full::new(Bytes::from_static(b"hello")))
            .unwrap();
        let addr: SocketAddr = "10.0.0.1:5555".parse().unwrap();

        let trusting = EngineSettings {
            trust_proxy: true,
            ..settings(16)
        };
        let ctx = into_context(req, Some(addr), &trusting).await.unwrap();
        assert_eq!(ctx.path(), "/upload");
        assert_eq!(ctx.body().as_ref(), b"hello");
        assert_eq!(ctx.ip().unwrap().to_string(), "203.0.113.9");
    }

    #[tokio::test]
    async fn test_body_limit_from_content_length() {
        let req = post()
            .header(header::CONTENT_LENGTH, "1000")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let err = into_context(req, None, &settings(10)).await.unwrap_err();
        assert_eq!(err.to_status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_limit_while_reading() {
        let req = post()
            .body(Full::new(Bytes::from(vec![b'a'; 64])))
            .unwrap();

        let err = into_context(req, None, &settings(10)).await.unwrap_err();
        assert!(matches!(err, Error::BodyTooLarge { limit: 10 }));

        // Exactly at the limit is fine
        let req = post()
            .body(Full::new(Bytes::from(vec![b'a'; 10])))
            .unwrap();
        assert!(into_context(req, None, &settings(10)).await.is_ok());
    }

    #[test]
    fn test_finalize_sets_server_header() {
        let name = HeaderValue::from_static("gantry");
        let response = finalize(Response::new(Body::default()), Some(&name));
        assert_eq!(response.headers().get(header::SERVER).unwrap(), "gantry");

        let mut custom = Response::new(Body::default());
        custom
            .headers_mut()
            .insert(header::SERVER, HeaderValue::from_static("mine"));
        let response = finalize(custom, Some(&name));
        assert_eq!(response.headers().get(header::SERVER).unwrap(), "mine");
    }
}
