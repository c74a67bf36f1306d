//! Chat command front end: validates requests and queues download tasks

pub mod handler;
pub mod parsing;

pub use handler::{CommandReply, handle_command, run_command_loop};
