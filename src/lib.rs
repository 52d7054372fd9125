//! Rewrites simulation scripts so that, instead of simulating, they record
//! the structure they would build, then runs them out-of-process and
//! captures that structure as a JSON document.

pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod session;

pub use error::{IntrospectError, MalformedScript, Result};
