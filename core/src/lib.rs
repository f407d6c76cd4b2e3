//! Core library for scripted deployments against AWS.
//!
//! Every wrapper is independent and reaches the provider only through a small
//! async trait, so the decision logic can be exercised without an account:
//! - [`stack`] creates, updates or re-creates a stack and waits until it settles.
//! - [`certificate`] finds or issues a DNS-validated certificate.
//! - [`registry_auth`] turns a registry token into a docker login.
//! - [`parameters`] copies a managed parameter between accounts.
//! - [`pipeline`] starts a delivery pipeline and waits for its final status.
//! - [`artifacts`] mirrors a downloadable artifact into a bucket.
//! - [`credentials`] assumes a role with an MFA code and caches the session.
//! - [`aws`] implements the traits above with the AWS SDK.
//! - [`config`], [`errors`], [`logging`] and [`poll`] are shared plumbing.

pub mod artifacts;
pub mod aws;
pub mod certificate;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod logging;
pub mod parameters;
pub mod pipeline;
pub mod poll;
pub mod registry_auth;
pub mod stack;
