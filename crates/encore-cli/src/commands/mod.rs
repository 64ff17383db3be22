pub mod common;
pub mod completions;
pub mod config;
pub mod demo;
pub mod lock;
pub mod queue;
pub mod songs;
pub mod submit;
pub mod vote;
pub mod watch;
