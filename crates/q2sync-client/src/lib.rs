#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::collapsible_else_if, clippy::field_reassign_with_default,
         clippy::manual_range_contains)]
// Client snapshot decoding, frame assembly and movement prediction.
pub mod client;
pub mod cl_ents;
pub mod cl_parse;
pub mod cl_pred;
pub mod cl_input;
pub mod cl_main;

#[cfg(test)]
mod test_support;

pub use cl_ents::{ClientCallbacks, NullCallbacks};
pub use cl_main::ClientConnection;
