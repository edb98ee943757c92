//! Library side of the CLI: the watch scheduler and terminal output.
pub mod output;
pub mod watch;
