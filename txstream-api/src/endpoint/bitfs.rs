use crate::auth::AuthProvider;
use crate::decode::DecoderKind;
use crate::endpoint::session::EndpointSession;
use crate::error::ApiError;
use crate::provider::Provider;
use bytes::Bytes;
use bytes::BytesMut;
use http::HeaderMap;
use http::Method;
use std::fmt;
use std::str::FromStr;
use txstream_client::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    In,
    Out,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::In => "in",
            Side::Out => "out",
        }
    }
}

/// Address of one pushdata chunk: `<txid>.(in|out).<script>.<chunk>`, with
/// an optional `scheme://` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfsUri {
    pub tx: String,
    pub side: Side,
    pub script: u32,
    pub chunk: u32,
}

impl BitfsUri {
    pub fn parse(uri: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::InvalidUri(uri.to_string());
        let path = uri.split_once("://").map_or(uri, |(_, rest)| rest);
        let mut parts = path.split('.');
        let (Some(tx), Some(side), Some(script), Some(chunk), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };
        if tx.is_empty() || !tx.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let side = match side {
            "in" => Side::In,
            "out" => Side::Out,
            _ => return Err(invalid()),
        };
        Ok(Self {
            tx: tx.to_string(),
            side,
            script: script.parse().map_err(|_| invalid())?,
            chunk: chunk.parse().map_err(|_| invalid())?,
        })
    }

    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl FromStr for BitfsUri {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BitfsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.tx,
            self.side.as_str(),
            self.script,
            self.chunk
        )
    }
}

pub struct BitfsClient<T: HttpTransport, A: AuthProvider> {
    session: EndpointSession<T, A>,
}

impl<T: HttpTransport, A: AuthProvider> BitfsClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            session: EndpointSession::new(transport, provider, auth),
        }
    }

    /// Downloads the whole file behind `uri`.
    pub async fn fetch(&self, uri: &BitfsUri) -> Result<Bytes, ApiError> {
        let records = self
            .session
            .open(
                Method::GET,
                &uri.path(),
                HeaderMap::new(),
                None,
                DecoderKind::Raw,
            )
            .await?
            .collect()
            .await?;
        let mut body = BytesMut::new();
        for record in records {
            body.extend_from_slice(&record.into_bytes());
        }
        Ok(body.freeze())
    }
}
