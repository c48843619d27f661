//! Transport abstraction unifying the Hub's inbound axum WebSocket with the
//! Agent's outbound `tokio-tungstenite` client, behind one send/receive
//! surface the [`super::bus::MessageBus`] can drive without caring which
//! side of the connection it's on.
//!
//! Grounded on the teacher's `ws.rs`, which wraps `tokio-tungstenite` in a
//! split writer/reader pair; generalized here into a trait so the Hub side
//! (axum's own WebSocket type) can share the same bus implementation.

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::MaybeTlsStream;

use crate::error::BusError;

/// A message received off the wire, decoded to the point of "is this text
/// I should hand to the bus, or is the connection ending".
pub enum TransportMessage {
    Text(String),
    /// The peer closed the connection (a close frame, or the stream ended).
    Closed,
}

/// One bidirectional WebSocket connection, abstracted over the concrete
/// stream type. Implementors are split into independent send/receive
/// halves so the bus can serialize writes under a mutex while a single
/// receive-loop task owns the read half exclusively (spec §4.1's
/// concurrency contract: exactly one reader, any number of writers).
#[async_trait]
pub trait TransportWriter: Send {
    async fn send_text(&mut self, text: String) -> Result<(), BusError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait TransportReader: Send {
    async fn recv(&mut self) -> TransportMessage;
}

// ---------------------------------------------------------------------
// Hub side: axum's WebSocket
// ---------------------------------------------------------------------

pub struct AxumWriter(SplitSink<WebSocket, AxumMessage>);
pub struct AxumReader(SplitStream<WebSocket>);

pub fn split_axum(ws: WebSocket) -> (AxumWriter, AxumReader) {
    let (sink, stream) = ws.split();
    (AxumWriter(sink), AxumReader(stream))
}

#[async_trait]
impl TransportWriter for AxumWriter {
    async fn send_text(&mut self, text: String) -> Result<(), BusError> {
        self.0
            .send(AxumMessage::Text(text))
            .await
            .map_err(|e| BusError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.send(AxumMessage::Close(None)).await;
    }
}

#[async_trait]
impl TransportReader for AxumReader {
    async fn recv(&mut self) -> TransportMessage {
        loop {
            match self.0.next().await {
                Some(Ok(AxumMessage::Text(text))) => return TransportMessage::Text(text),
                Some(Ok(AxumMessage::Close(_))) | None => return TransportMessage::Closed,
                Some(Err(_)) => return TransportMessage::Closed,
                // Ping/pong/binary frames carry no envelope; axum answers
                // pings automatically, so just keep reading.
                Some(Ok(_)) => continue,
            }
        }
    }
}

// ---------------------------------------------------------------------
// Agent side: tokio-tungstenite's client stream
// ---------------------------------------------------------------------

type TungsteniteStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TungsteniteWriter(SplitSink<TungsteniteStream, TungsteniteMessage>);
pub struct TungsteniteReader(SplitStream<TungsteniteStream>);

pub fn split_tungstenite(stream: TungsteniteStream) -> (TungsteniteWriter, TungsteniteReader) {
    let (sink, stream) = stream.split();
    (TungsteniteWriter(sink), TungsteniteReader(stream))
}

#[async_trait]
impl TransportWriter for TungsteniteWriter {
    async fn send_text(&mut self, text: String) -> Result<(), BusError> {
        self.0
            .send(TungsteniteMessage::Text(text))
            .await
            .map_err(|e| BusError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.send(TungsteniteMessage::Close(None)).await;
    }
}

#[async_trait]
impl TransportReader for TungsteniteReader {
    async fn recv(&mut self) -> TransportMessage {
        loop {
            match self.0.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return TransportMessage::Text(text),
                Some(Ok(TungsteniteMessage::Close(_))) | None => return TransportMessage::Closed,
                Some(Err(_)) => return TransportMessage::Closed,
                // Ping/pong/binary frames carry no envelope; tungstenite
                // answers pings automatically, so just keep reading.
                Some(Ok(_)) => continue,
            }
        }
    }
}
