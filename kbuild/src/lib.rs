//! kbuild
//!
//! Builds the i386 kernel image from its assembly and C sources and boots it
//! under QEMU. Everything is rebuilt on every run; tools are invoked one at a
//! time and the first failure aborts the target.
//!
//! - **config**: tool names, flag strings and source lists
//! - **paths**: source to object path mapping
//! - **flags**: shell-style flag splitting and composition
//! - **tool**: process invocation and the advisory presence check
//! - **pipeline**: the `all`, `debug`, `run` and `clean` targets

pub mod config;
pub mod error;
pub mod flags;
pub mod paths;
pub mod pipeline;
pub mod tool;

pub use config::{BuildConfig, ConfigOverrides, FlagConfig, ToolConfig};
pub use error::{BuildError, Result};
pub use pipeline::{Outcome, Pipeline, Target};
pub use tool::{Invocation, SystemRunner, ToolRunner};
