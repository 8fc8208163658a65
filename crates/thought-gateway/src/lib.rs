pub mod api;
pub mod ingest;
pub mod router;
pub mod server;
pub mod state;
pub mod updater;

pub use ingest::{IngestPipeline, IngestRequest, TagsInput};
pub use server::GatewayServer;
pub use updater::{UpdateCheck, Updater};
