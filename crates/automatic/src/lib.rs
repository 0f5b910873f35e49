//! HTTP client for a co-located AUTOMATIC1111 Stable Diffusion WebUI.
//!
//! Provides startup readiness probing and inference request forwarding
//! over the WebUI's `/sdapi/v1` REST API, with a bounded retry on
//! upstream gateway errors.

pub mod api;
pub mod probe;
