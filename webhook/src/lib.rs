//! A CustomResourceDefinition conversion webhook.
//!
//! The kube-apiserver posts `ConversionReview`s to the primary listener, whose objects are converted
//! between schema versions by a [`conversion::ConversionEngine`] and returned in the media type the
//! caller accepts. Request metrics are vended on a separate plaintext listener.
pub mod api;
pub mod config;
pub mod conversion;
pub mod error;
pub mod metrics;
pub mod negotiation;
pub mod review;
pub mod server;
pub mod telemetry;
pub mod tls;
