pub mod transport;

pub use transport::{
    DeliveredFile, HttpRelayTransport, HttpTransportConfig, InMemoryRelayTransport,
    RelayTransport, TransportError, WebhookUpload, DEFAULT_FETCH_TIMEOUT, DEFAULT_WEBHOOK_TIMEOUT,
};
