pub mod bootstrap;
pub mod chat;
pub mod router;
pub mod server;
pub mod state;

pub use chat::{ChatReply, ChatService};
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
