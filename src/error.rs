//! Error taxonomy for the HTTP message-sender subsystem.
//!
//! Two error types, deliberately kept separate:
//!
//! - [`SenderError`] tags the outcome of a single `try_url` call so the
//!   wantlist loop in [`crate::sender`] can decide whether to retry, move to
//!   the next entry, or abort the whole wantlist. It is transient — it never
//!   crosses the public API.
//! - [`NetworkError`] is returned from `connect`-time calls, where the
//!   caller has not yet committed to a peer and a real error is the right
//!   response (see spec §7's propagation policy).
use derive_more::{Display, Error, From};

/// Classification of a single request attempt against one endpoint.
///
/// Mirrors the upstream bitswap HTTP network's four-way split: a definitive
/// "not here" response is cheap and expected (`Client`), a broken endpoint is
/// expensive and should be backed off (`Server`), cancellation should never
/// count against an endpoint (`Context`), and anything else unrepresentable
/// aborts outright (`Fatal`).
#[derive(Debug, Display, Error, From)]
pub enum SenderError {
    /// Programming error or unrepresentable input (e.g. malformed CID while
    /// building the request). Aborts the whole wantlist.
    #[display(fmt = "fatal error building request: {}", _0)]
    Fatal(#[error(not(source))] String),

    /// Endpoint returned a definitive unavailability status (404/410/403/451).
    #[display(fmt = "client error: {}", _0)]
    Client(#[error(not(source))] String),

    /// Endpoint failure: transport error, 5xx/429, body-read failure, or a
    /// CID mismatch (protects against adversarial / buggy peers).
    #[display(fmt = "server error: {}", _0)]
    Server(#[error(not(source))] String),

    /// Outer cancellation or per-entry cancellation (a later `Cancel` entry
    /// for the same cid). Never counted against any endpoint.
    #[display(fmt = "context cancelled")]
    Context,
}

/// Errors returned from connect-time operations, where failing loudly is
/// correct because the caller has not yet committed to talking to this peer.
#[derive(Debug, Display, Error)]
pub enum NetworkError {
    /// The peer's advertised addresses contained no usable HTTP endpoint.
    #[display(fmt = "AddrInfo does not contain any valid HTTP addresses")]
    NoHttpAddresses,

    /// None of the peer's HTTP endpoints responded (successfully or
    /// otherwise) to the connect probe.
    #[display(fmt = "none of the peer HTTP endpoints responded successfully to request")]
    NoSuccess,

    /// An advertised URL's host could not be parsed while applying the
    /// allowlist filter.
    #[display(fmt = "could not parse host from URL: {}", _0)]
    InvalidUrlHost(String),

    /// The caller's context was cancelled while `Connect` was still probing
    /// endpoints — distinguishable from `NoSuccess` so a caller can tell
    /// "we gave up waiting" from "every endpoint genuinely failed".
    #[display(fmt = "connect cancelled before any endpoint succeeded")]
    Cancelled,
}
