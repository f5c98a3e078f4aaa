//! HTTP transport used to talk to the Inferable control plane.
//!
//! The [`Transport`] trait in [`traits`] is the seam the rest of the client
//! is written against; [`http::HttpTransport`] is the production
//! implementation on top of `hyper` and `rustls`.

#![warn(missing_docs, clippy::pedantic)]

pub mod http;
pub mod traits;

pub use http::{HttpTransport, HttpTransportConfig};
pub use traits::{
    FetchRequest, FetchResponse, Transport, TransportError, TransportResult, path_from_segments,
};
