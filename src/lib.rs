#[macro_use]
extern crate tracing;

pub mod app;
pub mod compact;
pub mod cycle;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod logging;
pub mod seed;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod time;

#[cfg(test)]
mod test_support;

pub use cycle::{
    CollectionCycle,
    CycleReport,
};
pub use error::WaitsError;
pub use park_waits_config::{
    Catalog,
    RemoteCredentials,
    Settings,
};
