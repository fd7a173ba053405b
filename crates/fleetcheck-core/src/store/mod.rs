//! Local and remote store contracts plus their production implementations

mod http;
mod local;
mod remote;
mod sqlite;

#[cfg(test)]
pub mod memory;

pub use http::{HttpProbe, HttpRemoteStore, RemoteConfig};
pub use local::{LocalStore, LocalWriter, StoreCounts};
pub use remote::{ConnectivityProbe, FetchWindow, PushOutcome, RemoteStore};
pub use sqlite::{SharedDatabase, SqliteStore};
