pub mod api_client;
pub mod error;
pub mod socket;
pub mod store;

pub use api_client::{ApiClient, CheckoutSession, PostPage, PresignedUpload, UploadKind};
pub use error::ClientError;
pub use socket::SocketClient;
pub use store::Store;
