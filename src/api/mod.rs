// Inventory API client: transport, retry and the authenticated connection
pub mod transport;
pub mod retry;
pub mod connection;

pub use connection::{ApiConnection, CleaningStatus};
pub use retry::{RetryOutcome, RetryPolicy};
pub use transport::{ReqwestTransport, TransportOptions};
