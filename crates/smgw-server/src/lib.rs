//! IP-T master node.
//!
//! Ties the pure state machines from `smgw-core` to the outside world:
//! a tokio TCP transport with strictly ordered writes, the session
//! driver that executes state-machine actions, the JSON configuration
//! file, the NMS line protocol and the command-line surface.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod nms;
pub mod transport;

pub use config::{FileConfig, load_config};
pub use driver::ServerDriver;
pub use error::ServerError;
pub use transport::IptListener;
