//! Raw request body capture.
//!
//! Signature verification needs the body exactly as it arrived on the wire, so
//! the webhook handler reads it as bytes instead of going through a JSON
//! extractor. The bytes are stored in the request extensions after the first
//! read; later reads return the stored copy instead of touching the already
//! drained stream.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap},
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::debug;

/// Failure to capture the request body
#[derive(Debug, thiserror::Error)]
pub enum RawBodyError {
    #[error("Body exceeds {max_size} bytes")]
    TooLarge {
        declared_size: Option<u64>,
        max_size: usize,
    },

    #[error("Body stream failed: {message}")]
    Read { message: String },
}

/// Extension holding the captured body of a request
#[derive(Debug, Clone)]
struct CapturedBody(Bytes);

/// Read the complete body of `request`, at most `max_size` bytes.
///
/// A declared `Content-Length` above the limit is rejected before any byte is
/// read. Otherwise the stream is consumed through a length limit so no more
/// than `max_size` bytes are ever buffered.
pub async fn read_raw_body(request: &mut Request, max_size: usize) -> Result<Bytes, RawBodyError> {
    if let Some(CapturedBody(bytes)) = request.extensions().get::<CapturedBody>() {
        return Ok(bytes.clone());
    }

    if let Some(declared) = declared_length(request.headers()) {
        if declared > max_size as u64 {
            debug!(declared, max_size, "Declared body length exceeds limit");
            return Err(RawBodyError::TooLarge {
                declared_size: Some(declared),
                max_size,
            });
        }
    }

    let body = std::mem::replace(request.body_mut(), Body::empty());
    let bytes = match Limited::new(body, max_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(RawBodyError::TooLarge {
                declared_size: None,
                max_size,
            });
        }
        Err(e) => {
            return Err(RawBodyError::Read {
                message: e.to_string(),
            });
        }
    };

    request
        .extensions_mut()
        .insert(CapturedBody(bytes.clone()));
    Ok(bytes)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
#[path = "body_tests.rs"]
mod tests;
