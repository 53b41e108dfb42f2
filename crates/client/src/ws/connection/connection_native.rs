//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use super::{Connector, Transport, TransportError};

/// Opens WebSocket connections, presenting the token both as a bearer header
/// and a `token` query parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// Build the connection URL for an endpoint and token.
pub(crate) fn endpoint_url(endpoint: &str, token: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| TransportError::Connect(format!("invalid endpoint {endpoint}: {e}")))?;
    if !token.is_empty() {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let url = endpoint_url(endpoint, token)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Connect(format!("invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!("WebSocket connected to {}", endpoint);

        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(msg_result) = self.stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("WebSocket received close frame: {:?}", frame);
                    return None;
                }
                Ok(_) => {
                    // Pong is handled automatically by tungstenite; binary is not part of the protocol
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
