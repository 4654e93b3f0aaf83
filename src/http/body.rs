//! Builds streamed file/zip responses, keeping the relevant lock guard (and,
//! for zips, the backing temp file) alive for the lifetime of the body.

use axum::body::StreamBody;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

use crate::path_lock::FileReadGuard;
use crate::stream_io::GuardedStream;

/// `inline` never carries a `filename` parameter - the original only sets
/// one for `attachment` responses, so a bare guessed-MIME view stays just
/// `"inline"`.
fn content_disposition(disposition: &str, filename: &str) -> String {
    if disposition == "inline" {
        return disposition.to_string();
    }
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
    format!("{disposition}; filename=\"{filename}\"; filename*=UTF-8''{encoded}")
}

pub fn file_stream_response(
    content_type: String,
    disposition: &str,
    filename: &str,
    guard: FileReadGuard,
    file: tokio::fs::File,
) -> Response {
    let stream = GuardedStream::new(guard, ReaderStream::new(file));
    stream_response(content_type, disposition, filename, stream)
}

pub fn zip_stream_response(
    filename: &str,
    stream: impl Stream<Item = std::io::Result<Bytes>> + Send + 'static,
) -> Response {
    stream_response("application/zip".to_string(), "attachment", filename, stream)
}

fn stream_response(
    content_type: String,
    disposition: &str,
    filename: &str,
    stream: impl Stream<Item = std::io::Result<Bytes>> + Send + 'static,
) -> Response {
    let body = StreamBody::new(stream);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, filename),
        )
        .body(axum::body::boxed(body))
        .unwrap()
        .into_response()
}
