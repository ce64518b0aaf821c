pub mod shutdown;
pub mod startup;

pub use startup::{AppContext, Models, prepare_server_startup};
