//! OmniPA shopping server: the remote store that clients sync against.

pub mod config;
pub mod db;
pub mod server;
