//! Streaming the result bundle back to the caller.
//!
//! The response body owns the workspace, so the directory outlives the
//! handler and is removed once the body is dropped, whether the download
//! finished or the client went away.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::Response;
use futures::Stream;
use idiogen_core::{DOWNLOAD_NAME, Workspace};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{ServerError, ServerResult};

/// Media type of the bundle.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Build the download response for `bundle`, handing `workspace` to the body.
pub async fn deliver(bundle: &Path, workspace: Workspace) -> ServerResult<Response> {
    let file = File::open(bundle)
        .await
        .map_err(|e| idiogen_core::Error::io(bundle, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| idiogen_core::Error::io(bundle, e))?
        .len();

    let body = Body::from_stream(BundleBody::new(file, workspace));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ZIP_CONTENT_TYPE)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", DOWNLOAD_NAME),
        )
        .header(header::CONTENT_LENGTH, len)
        .body(body)
        .map_err(|e| ServerError::Response(e.to_string()))
}

/// File stream that keeps its workspace alive until dropped.
pub struct BundleBody {
    inner: ReaderStream<File>,
    workspace: Workspace,
    finished: bool,
}

impl BundleBody {
    pub fn new(file: File, workspace: Workspace) -> Self {
        Self {
            inner: ReaderStream::new(file),
            workspace,
            finished: false,
        }
    }
}

impl Stream for BundleBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = poll {
            self.finished = true;
        }
        poll
    }
}

impl Drop for BundleBody {
    fn drop(&mut self) {
        if self.finished {
            tracing::debug!(workspace = %self.workspace.id(), "phase: delivered");
        } else {
            tracing::info!(workspace = %self.workspace.id(), "download aborted before completion");
        }
    }
}
