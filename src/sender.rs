//! C6 — the per-(peer, message) send state machine.
//!
//! Translated near line-for-line from the upstream `msg_sender.go`: the
//! `WANTLIST_LOOP`/`URL_LOOP` structure survives as a labeled Rust loop, and
//! `tryURL`'s status-code dispatch survives as [`MessageSender::try_url`]'s
//! match on [`reqwest::StatusCode`].
use std::time::Duration;

use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::SenderOptions;
use crate::connect_events::PeerId;
use crate::endpoint::{self, Best, EndpointState};
use crate::error::SenderError;
use crate::message::{Entry, ResponseMessage, WantType, WantlistMessage};
use crate::network::HttpNetwork;
use crate::prefix::verify_block;

/// A send session for one peer, encapsulating its own endpoint error state
/// for the session's lifetime. Created via
/// [`crate::network::HttpNetwork::new_message_sender`].
pub struct MessageSender {
    peer: PeerId,
    urls: Vec<EndpointState>,
    network: HttpNetwork,
    opts: SenderOptions,
    closing: CancellationToken,
}

impl MessageSender {
    pub(crate) fn new(peer: PeerId, urls: Vec<EndpointState>, network: HttpNetwork, opts: SenderOptions) -> Self {
        MessageSender {
            peer,
            urls,
            network,
            opts,
            closing: CancellationToken::new(),
        }
    }

    pub fn supports_have(&self) -> bool {
        self.network.supports_have()
    }

    /// Aborts any in-flight operations for this sender. Idempotent.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Sends `msg`'s wantlist, issuing HTTP requests against this sender's
    /// endpoints and delivering whatever it collects to the network's
    /// registered receivers.
    ///
    /// `cancel` is the caller's own context (spec §5: the per-request scope
    /// is the intersection of caller context, the sender's close signal, and
    /// the per-entry `RequestTracker` scope). Entries are walked in the
    /// order `msg` provides them — not by priority — because the inbound
    /// message already encodes the upstream's chosen order (spec §4.4, §9).
    /// This call never fails upward: all failure is expressed through the
    /// response message, the receivers' error channel, or `DisconnectFrom`,
    /// since returning an error here would tear down the upstream send
    /// queue, and partial success (some endpoints failing, others
    /// succeeding) is the normal case, not an exceptional one.
    pub async fn send_msg(&mut self, msg: WantlistMessage, cancel: &CancellationToken) {
        if msg.is_empty() {
            return;
        }

        // A child of the caller's token, additionally cancelled if this
        // sender is closed mid-call — the same shape as `msg_sender.go`'s
        // `ctx, cancel := context.WithCancel(ctx)` plus its goroutine
        // watching `sender.closing`, except the watcher here is bounded to
        // this one call (aborted below) rather than living until the
        // sender itself closes.
        let call_scope = cancel.child_token();
        let watcher = {
            let call_scope = call_scope.clone();
            let closing = self.closing.clone();
            tokio::spawn(async move {
                closing.cancelled().await;
                call_scope.cancel();
            })
        };

        let mut response = ResponseMessage::default();
        let mut abort_err: Option<SenderError> = None;
        let mut disconnect = false;

        'wantlist: for entry in &msg.entries {
            if call_scope.is_cancelled() {
                abort_err = Some(SenderError::Context);
                break 'wantlist;
            }

            if entry.cancel {
                self.network.cancel_request(&entry.cid);
                continue 'wantlist;
            }

            let scope = self.network.request_scope(&call_scope, entry.cid);

            loop {
                if call_scope.is_cancelled() {
                    abort_err = Some(SenderError::Context);
                    break 'wantlist;
                }

                let outcome = match endpoint::best(&mut self.urls, self.opts.max_retries) {
                    Best::ServerExhausted => {
                        disconnect = true;
                        abort_err = Some(SenderError::Server("all endpoints exceeded server error retries".into()));
                        None
                    }
                    Best::NoneForEntry => {
                        break;
                    }
                    Best::Endpoint(endpoint) => Some(
                        Self::try_url(&self.network, self.opts, &self.peer, endpoint, entry, &mut response, scope.token()).await,
                    ),
                };

                let Some(result) = outcome else {
                    break 'wantlist;
                };

                match result {
                    Ok(()) => break,
                    Err(SenderError::Fatal(msg)) => {
                        error!(cid = %entry.cid, %msg, "fatal error sending wantlist entry");
                        abort_err = Some(SenderError::Fatal(msg));
                        break 'wantlist;
                    }
                    Err(SenderError::Client(_)) => continue,
                    Err(SenderError::Server(_)) => continue,
                    Err(SenderError::Context) => break,
                }
            }

            drop(scope);
            endpoint::reset_client_errors(&mut self.urls);
        }

        if disconnect {
            self.network.disconnect_from(&self.peer).await;
        }

        if !response.is_empty() {
            self.network.deliver(self.peer.clone(), response).await;
        } else if let Some(err) = abort_err {
            self.network.deliver_error(err.to_string()).await;
        }

        watcher.abort();
    }

    /// Attempts one request against `endpoint` for `entry`, recording the
    /// outcome into `response`. Returns `Ok(())` on success, or a tagged
    /// error describing what went wrong and how the caller should react.
    ///
    /// Takes its collaborators as explicit parameters rather than `&self`:
    /// the caller holds a `&mut` into one element of `self.urls` (via
    /// [`endpoint::best`]) for the duration of the call, which a `&self`
    /// receiver here would alias.
    async fn try_url(
        network: &HttpNetwork,
        opts: SenderOptions,
        peer: &PeerId,
        endpoint: &mut EndpointState,
        entry: &Entry,
        response: &mut ResponseMessage,
        cancel: &CancellationToken,
    ) -> Result<(), SenderError> {
        if let Some(deadline) = endpoint.cooldown {
            let now = tokio::time::Instant::now();
            if deadline > now {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = cancel.cancelled() => return Err(SenderError::Context),
                }
            }
        }

        let method = match entry.want_type {
            WantType::Block => Method::GET,
            WantType::Have => Method::HEAD,
        };

        let request = network.build_request(&endpoint.url, method.clone(), &entry.cid.to_string());

        debug!(method = %method, url = %endpoint.url, cid = %entry.cid, "issuing request");
        network.stats().messages_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        network.metrics().requests_in_flight.inc();

        let result = tokio::select! {
            r = tokio::time::timeout(opts.send_timeout, request.send()) => r,
            _ = cancel.cancelled() => {
                network.metrics().requests_in_flight.dec();
                return Err(SenderError::Context);
            }
        };

        let response_result = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                network.metrics().requests_failure.inc();
                network.metrics().requests_in_flight.dec();
                if cancel.is_cancelled() {
                    return Err(SenderError::Context);
                }
                warn!(url = %endpoint.url, %err, "transport error");
                endpoint.server_errors += 1;
                return Err(SenderError::Server(err.to_string()));
            }
            Err(_timeout) => {
                network.metrics().requests_failure.inc();
                network.metrics().requests_in_flight.dec();
                if cancel.is_cancelled() {
                    return Err(SenderError::Context);
                }
                endpoint.server_errors += 1;
                return Err(SenderError::Server("request timed out".into()));
            }
        };

        if response_result.version() != reqwest::Version::HTTP_2 {
            warn!(url = %endpoint.url, version = ?response_result.version(), "endpoint is not using HTTP/2");
        }

        let status = response_result.status();
        let headers = response_result.headers().clone();
        let max_block_size = network.max_block_size();

        let body = read_limited(response_result, max_block_size).await;
        network.metrics().requests_in_flight.dec();

        let body = match body {
            Ok(b) => b,
            Err(err) => {
                network.metrics().requests_body_failure.inc();
                endpoint.server_errors += 1;
                return Err(SenderError::Server(format!("error reading body: {err}")));
            }
        };

        network.metrics().response_size.observe(body.len() as f64);
        network.metrics().update_status_counter(status.as_u16());
        network.on_message(peer.clone());

        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::FORBIDDEN | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
                network.clear_cooldown(endpoint);
                endpoint.client_errors += 1;
                if entry.send_dont_have {
                    response.add_dont_have(entry.cid);
                }
                Err(SenderError::Client(format!("{} -> {}", endpoint.url, status)))
            }
            StatusCode::OK => {
                network.clear_cooldown(endpoint);
                if method == Method::HEAD {
                    response.add_have(entry.cid);
                    return Ok(());
                }
                if !verify_block(&entry.cid, &body) {
                    warn!(cid = %entry.cid, url = %endpoint.url, "block received does not match requested cid");
                    endpoint.server_errors += 1;
                    return Err(SenderError::Server("block does not match requested cid".into()));
                }
                response.add_block(crate::block::Block::new(body, entry.cid));
                network.stats().messages_recvd.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            }
            _ => {
                let backoff = retry_after(&headers).unwrap_or(opts.send_error_backoff);
                network.set_cooldown(endpoint, backoff);
                endpoint.server_errors += 1;
                Err(SenderError::Server(format!("{} -> {}", endpoint.url, status)))
            }
        }
    }
}

async fn read_limited(resp: reqwest::Response, max_size: u64) -> Result<bytes::Bytes, reqwest::Error> {
    use futures::StreamExt;
    let mut stream = resp.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        if buf.len() as u64 >= max_size {
            buf.truncate(max_size as usize);
            break;
        }
    }
    Ok(bytes::Bytes::from(buf))
}

/// Parses a `Retry-After` header, supporting both the delay-seconds and
/// HTTP-date forms (RFC 7231 §7.1.3).
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = httpdate::parse_http_date(raw).ok()?;
    let now = std::time::SystemTime::now();
    when.duration_since(now).ok()
}
