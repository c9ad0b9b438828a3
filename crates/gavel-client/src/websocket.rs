//! WebSocket transport.

use crate::transport::{Connector, Link};
use crate::TransportError;
use futures_util::{SinkExt, StreamExt, future};
use std::future::Future;
use tokio_tungstenite::tungstenite::Message;

/// Connects to a `ws://` or `wss://` endpoint, one text frame per record.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send {
        let url = self.url.clone();
        async move {
            let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
            tracing::debug!(%url, "websocket handshake complete");
            let (sink, stream) = ws.split();

            let sink = sink.sink_map_err(TransportError::from).with(|text: String| {
                future::ready(Ok::<_, TransportError>(Message::Text(text.into())))
            });

            // Control frames are answered by tungstenite; only text carries records.
            let stream = stream.filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

            Ok(Link::new(Box::pin(sink), Box::pin(stream)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn text_frames_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let authority = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let received = ws.next().await.unwrap().unwrap();
            ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"end"}"#.to_string().into()))
                .await
                .unwrap();
            received
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/ws"));
        let Link {
            mut sink,
            mut stream,
        } = connector.connect().await.unwrap();
        sink.send(r#"{"type":"bid"}"#.to_string()).await.unwrap();

        // The binary frame never surfaces.
        assert_eq!(stream.next().await.unwrap().unwrap(), r#"{"type":"end"}"#);
        assert_eq!(
            authority.await.unwrap(),
            Message::Text(r#"{"type":"bid"}"#.to_string().into())
        );
    }

    #[tokio::test]
    async fn refused_handshake_is_a_websocket_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WebSocketConnector::new(format!("ws://{addr}/ws"))
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::WebSocket(_)), "{err:?}");
    }
}
