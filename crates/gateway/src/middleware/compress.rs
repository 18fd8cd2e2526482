//! Response compression built on tower-http's `CompressionLayer`.
//!
//! gzip and deflate are negotiated from `Accept-Encoding` (quality values
//! honored). Responses that already carry a `Content-Encoding`, bodies below
//! the configured threshold and media that is already compressed pass
//! through untouched. Bodies are encoded as they stream.

use tower_http::compression::{
    CompressionLayer,
    predicate::{NotForContentType, Predicate, SizeAbove},
};

/// Build the compression layer for bodies of at least `threshold` bytes.
#[must_use]
pub fn compression_layer(threshold: u16) -> CompressionLayer<impl Predicate> {
    let predicate = SizeAbove::new(threshold)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::new("video/"))
        .and(NotForContentType::new("audio/"))
        .and(NotForContentType::new("application/zip"))
        .and(NotForContentType::new("application/gzip"))
        .and(NotForContentType::GRPC)
        .and(NotForContentType::SSE);

    CompressionLayer::new()
        .gzip(true)
        .deflate(true)
        .br(false)
        .zstd(false)
        .compress_when(predicate)
}
