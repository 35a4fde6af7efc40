//! Engine error re-exports
//!
//! Re-exports codeport-error so engine modules and downstream crates share one type.

pub use codeport_error::{Error, ErrorKind, ErrorStatus, Result};
