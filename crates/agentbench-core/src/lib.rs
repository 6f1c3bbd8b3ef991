pub mod config;
pub mod error;
pub mod io;
pub mod materialize;
pub mod orchestrator;
pub mod paths;
pub mod report;
pub mod results;
pub mod scenario;
pub mod session;
pub mod shell;
pub mod validate;

pub use error::{BenchError, ErrorKind, Result};
