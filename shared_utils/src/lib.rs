//! Small helpers shared by the workspace binaries: environment lookup and
//! tracing initialisation.

#![deny(missing_docs)]

pub mod env;
pub mod logging;
