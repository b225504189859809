//! An HTTP-based transport for bitswap-style block exchange: the client
//! side of fetching blocks and have-checks from peers that expose an IPFS
//! gateway-shaped HTTP endpoint, as an alternative to the libp2p stream
//! transport.
//!
//! [`network::HttpNetwork`] is the front object; [`sender::MessageSender`]
//! is the per-peer send state machine it hands out; [`router::Router`]
//! dispatches between this transport and a non-HTTP fallback.
pub mod block;
pub mod config;
pub mod connect_events;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod metrics;
pub mod network;
pub mod pinger;
pub mod prefix;
pub mod request_tracker;
pub mod router;
pub mod sender;
pub mod wantlist;

pub use block::Block;
pub use config::{HttpNetworkConfig, SenderOptions};
pub use connect_events::{PeerId, Receiver};
pub use error::{NetworkError, SenderError};
pub use message::{Entry, ResponseMessage, WantType, WantlistMessage};
pub use network::HttpNetwork;
pub use router::{PeerAddrs, Router, SendSession, StreamNetwork};
pub use sender::MessageSender;
pub use wantlist::Wantlist;
