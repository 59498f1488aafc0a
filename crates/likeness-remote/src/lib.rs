//! likeness-remote — Face capabilities served over HTTP.
//!
//! Talks to a DeepFace-compatible service (`POST /verify`, `POST /analyze`)
//! and exposes it through the `likeness-core` capability traits.

pub mod client;
pub mod wire;

pub use client::{DeepFaceClient, RemoteConfig};
