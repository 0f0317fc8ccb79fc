pub mod feed;
pub mod operation;
pub mod transport;

pub use feed::FeedPage;
pub use operation::OperationExecutor;
pub use transport::AttemptTransport;
