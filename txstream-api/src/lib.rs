//! Streaming clients for the Bitbus, Bitsocket and BitFS transaction APIs.
//!
//! Every request is driven by a [`RequestEngine`] that decodes the response
//! body incrementally and releases records only on demand. On top of it sit
//! the endpoint clients, the crawl-then-listen [`crossover::Orchestrator`]
//! and the two-source [`join::JoinClient`].

pub mod auth;
pub mod crossover;
pub mod decode;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod join;
pub mod provider;
pub mod query;
pub mod record;

pub use crate::auth::AuthProvider;
pub use crate::auth::StaticToken;
pub use crate::decode::DecoderKind;
pub use crate::endpoint::bitbus::BitbusClient;
pub use crate::endpoint::bitbus::Status;
pub use crate::endpoint::bitfs::BitfsClient;
pub use crate::endpoint::bitfs::BitfsUri;
pub use crate::endpoint::bitsocket::BitsocketClient;
pub use crate::endpoint::bitsocket::LiveListener;
pub use crate::engine::EngineHandle;
pub use crate::engine::RecordStream;
pub use crate::engine::RequestEngine;
pub use crate::error::ApiError;
pub use crate::join::JoinClient;
pub use crate::join::JoinOptions;
pub use crate::join::JoinResult;
pub use crate::provider::Provider;
pub use crate::record::Record;
pub use crate::record::tx_id;
pub use txstream_client::ReqwestTransport;
pub use txstream_client::TransportError;
