#![allow(clippy::needless_range_loop, clippy::float_cmp, clippy::collapsible_else_if,
         clippy::len_without_is_empty, clippy::new_without_default)]

pub mod error;
pub mod q_shared;
pub mod qcommon;
pub mod common;
pub mod cvar;
pub mod net_queue;

pub use error::{ProtocolError, Result};
