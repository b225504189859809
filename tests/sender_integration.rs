//! End-to-end coverage of [`bitswap_httpnet::MessageSender`]'s HTTP stack
//! against a real (mocked) server, exercising the scenarios spec §8 names:
//! a successful GET (S1), a definitive 404 producing a `DontHave` (S3), a
//! `HEAD` have-check (S2), a `Retry-After`-driven cooldown (S4), server-error
//! exhaustion triggering disconnect (S5), mid-flight cancellation (S6), a
//! CID/body mismatch being treated as a server error, and allowlist
//! enforcement on `Connect`.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use multihash::{Code, MultihashDigest};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bitswap_httpnet::{Entry, HttpNetwork, HttpNetworkConfig, PeerId, Receiver, ResponseMessage, WantlistMessage};

fn raw_cid(data: &[u8]) -> Cid {
    let hash = Code::Sha2_256.digest(data);
    Cid::new_v1(0x55, hash)
}

#[derive(Default)]
struct CollectingReceiver {
    messages: Mutex<Vec<ResponseMessage>>,
    errors: Mutex<Vec<String>>,
    connects: Mutex<Vec<PeerId>>,
    disconnects: Mutex<Vec<PeerId>>,
}

#[async_trait]
impl Receiver for CollectingReceiver {
    async fn receive_message(&self, _from: PeerId, msg: ResponseMessage) {
        self.messages.lock().unwrap().push(msg);
    }

    async fn receive_error(&self, err: String) {
        self.errors.lock().unwrap().push(err);
    }

    async fn peer_connected(&self, peer: PeerId) {
        self.connects.lock().unwrap().push(peer);
    }

    async fn peer_disconnected(&self, peer: PeerId) {
        self.disconnects.lock().unwrap().push(peer);
    }
}

async fn mount_connect_probe(server: &MockServer) {
    // Any completed response to the well-known probe counts as success.
    Mock::given(method("GET"))
        .and(path("/ipfs/bafyaabakaieac"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetches_a_block_over_get() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let content = b"hello from the block exchange\n".to_vec();
    let cid = raw_cid(&content);
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-a".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let msg = WantlistMessage::new(vec![Entry::new_block(cid, 1)]);
    network.send_message(peer, msg, &cancel).await.unwrap();

    // delivery happens in a spawned task; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = receiver.messages.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].blocks().len(), 1);
    assert_eq!(delivered[0].blocks()[0].data(), content.as_slice());
    assert_eq!(delivered[0].blocks()[0].cid(), &cid);
}

#[tokio::test]
async fn missing_block_with_send_dont_have_reports_dont_have() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"a block nobody has");
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-b".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let entry = Entry::new_block(cid, 1).with_send_dont_have(true);
    let msg = WantlistMessage::new(vec![entry]);
    network.send_message(peer, msg, &cancel).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = receiver.messages.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].dont_haves(), &[cid]);
    assert!(delivered[0].blocks().is_empty());
}

#[tokio::test]
async fn have_check_uses_head_and_records_presence() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"presence only, no body needed");
    Mock::given(method("HEAD"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default().with_supports_have(true));
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-c".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let msg = WantlistMessage::new(vec![Entry::new_have(cid, 1)]);
    network.send_message(peer, msg, &cancel).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = receiver.messages.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].haves(), &[cid]);
}

#[tokio::test]
async fn retry_after_header_delays_the_next_attempt() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"always busy");
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "1"))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-d".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let msg = WantlistMessage::new(vec![Entry::new_block(cid, 1)]);
    let start = std::time::Instant::now();
    network.send_message(peer, msg, &cancel).await.unwrap();
    let elapsed = start.elapsed();

    // default max_retries=1 means a second attempt follows the first 503,
    // and the registry-wide cooldown set from `Retry-After: 1` must be
    // waited out before that second attempt fires.
    assert!(elapsed >= Duration::from_millis(950), "elapsed = {elapsed:?}");
}

#[tokio::test]
async fn server_error_exhaustion_disconnects_and_aborts_wantlist() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"always broken");
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-e".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let msg = WantlistMessage::new(vec![Entry::new_block(cid, 1)]);
    network.send_message(peer.clone(), msg, &cancel).await.unwrap();

    // the sole endpoint needs two failures (max_retries=1) to exhaust, with
    // a 1s cooldown between them (no Retry-After header on a plain 500).
    tokio::time::sleep(Duration::from_millis(1300)).await;

    let delivered = receiver.messages.lock().unwrap();
    assert!(delivered.iter().all(|m| m.blocks().is_empty()));
    let disconnects = receiver.disconnects.lock().unwrap();
    assert_eq!(disconnects.as_slice(), &[peer]);
}

#[tokio::test]
async fn cancel_entry_aborts_an_in_flight_get_for_the_same_cid() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"slow block nobody waits for");
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)).set_body_bytes(b"late".to_vec()))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-f".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let net2 = network.clone();
    let peer2 = peer.clone();
    let cancel2 = cancel.clone();
    let in_flight = tokio::spawn(async move {
        let msg = WantlistMessage::new(vec![Entry::new_block(cid, 1)]);
        let start = std::time::Instant::now();
        net2.send_message(peer2, msg, &cancel2).await.unwrap();
        start.elapsed()
    });

    // give the GET time to actually be registered as in-flight before
    // cancelling it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancel_msg = WantlistMessage::new(vec![Entry::cancel(cid)]);
    network.send_message(peer, cancel_msg, &cancel).await.unwrap();

    let elapsed = in_flight.await.unwrap();
    assert!(elapsed < Duration::from_millis(400), "elapsed = {elapsed:?}");

    let delivered = receiver.messages.lock().unwrap();
    assert!(delivered.is_empty());
}

#[tokio::test]
async fn mismatched_body_is_a_server_error_and_adds_no_block() {
    let server = MockServer::start().await;
    mount_connect_probe(&server).await;

    let cid = raw_cid(b"expected content");
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{cid}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wrong content".to_vec()))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(HttpNetworkConfig::default());
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-g".into());
    let url = Url::parse(&server.uri()).unwrap();
    let cancel = CancellationToken::new();
    network.connect(peer.clone(), vec![url], &cancel).await.unwrap();

    let msg = WantlistMessage::new(vec![Entry::new_block(cid, 1)]);
    network.send_message(peer.clone(), msg, &cancel).await.unwrap();

    // a CID mismatch doesn't set a cooldown, so both attempts (max_retries=1)
    // happen back to back.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let delivered = receiver.messages.lock().unwrap();
    assert!(delivered.iter().all(|m| m.blocks().is_empty()));
    let disconnects = receiver.disconnects.lock().unwrap();
    assert_eq!(disconnects.as_slice(), &[peer]);
}

#[tokio::test]
async fn allowlist_restricts_connect_to_listed_hosts() {
    let allowed = MockServer::start().await;
    let blocked = MockServer::start().await;
    mount_connect_probe(&allowed).await;
    mount_connect_probe(&blocked).await;

    let allowed_url = Url::parse(&allowed.uri()).unwrap();
    let blocked_url = Url::parse(&blocked.uri()).unwrap();
    let allowed_host = allowed_url.host_str().unwrap().to_string();

    let network = HttpNetwork::new(HttpNetworkConfig::default().with_allowlist([allowed_host]));
    let receiver = Arc::new(CollectingReceiver::default());
    network.start(vec![receiver.clone()]);

    let peer = PeerId("peer-h".into());
    let cancel = CancellationToken::new();
    network
        .connect(peer.clone(), vec![blocked_url, allowed_url], &cancel)
        .await
        .unwrap();

    assert_eq!(blocked.received_requests().await.unwrap().len(), 0);
    assert!(!allowed.received_requests().await.unwrap().is_empty());
}
