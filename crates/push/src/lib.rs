pub mod events;
pub mod fabric;
pub mod registry;
pub mod ws;

pub use fabric::{PushFabric, PushTarget};
pub use registry::{RegistryStats, SessionRegistry};
pub use ws::{ws_handler, ConnectQuery, PushState};
