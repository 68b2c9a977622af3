mod config_cmd;
mod pending;
mod shopping;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use pending::PendingCommand;
pub use shopping::ShoppingCommand;
pub use sync_cmd::SyncCommand;
