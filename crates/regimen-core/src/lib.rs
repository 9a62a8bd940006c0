pub mod event_bus;
pub mod jobs;
pub mod state_store;
pub mod sync;

pub use event_bus::*;
pub use jobs::*;
pub use state_store::*;
pub use sync::*;
