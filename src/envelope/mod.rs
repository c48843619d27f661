//! Wire frames, transport abstraction, and the multiplexed message bus built
//! on top of them.

pub mod bus;
pub mod frame;
pub mod transport;

pub use bus::MessageBus;
pub use frame::{
    Ack, CompletionsChoice, CompletionsRequest, CompletionsResponse, Envelope, ListModelsResponse,
    MessageKind, Model, ServerInfo, Usage, WorkerInfo,
};
pub use transport::{
    split_axum, split_tungstenite, AxumReader, AxumWriter, TransportMessage, TransportReader,
    TransportWriter, TungsteniteReader, TungsteniteWriter,
};
