//! `agent-driver`: async driver for coding-agent subprocesses.
//!
//! Two kinds of process are driven here:
//!
//! ```text
//! SessionRequest
//!     │
//!     ▼
//! SessionPool      ← bounded parallelism, one live session per key
//!     │
//!     ▼
//! AgentProcess     ← prompt on stdin, stdout+stderr into a transcript,
//!                    killed when the session timeout fires
//!
//! WorkerProcess    ← long-lived, speaks JSON lines both ways; every parsed
//!                    line and the final exit are forwarded on an mpsc channel
//! ```
//!
//! Nothing in this crate knows about scenarios or validation. Callers map a
//! [`SessionOutcome`] onto their own result types.

pub mod error;
pub mod pool;
pub(crate) mod process;
pub mod session;
pub mod worker;

pub use error::AgentDriverError;
pub use pool::SessionPool;
pub use session::{run_session, ProcessExit, SessionOutcome, SessionRequest};
pub use worker::{WorkerEvent, WorkerProcess, WorkerSpec};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AgentDriverError>;
