pub mod cli;
pub mod config;
pub mod grouping;
pub mod indexer;
pub mod model;
pub mod rpc;
pub mod search;
pub mod session;
pub mod source;
pub mod store;
pub mod util;
pub mod watch;
