//! Core library for fragrun: register code fragments, assemble them into a
//! program and run it in a bounded sandbox.
//!
//! # Architecture Overview
//!
//! - **Registry**: ordered fragment store and dependency set behind [`RegistryStore`]
//! - **Assembler**: joins fragments into one program, requiring a `main` fragment
//! - **Provisioners**: make declared packages available, on the host or inside a container
//! - **Executors**: local subprocess and Docker container sandboxes with a wall-clock budget
//! - **Runner**: the end-to-end pipeline producing one terminal [`RunResult`] per run
//! - **Configuration**: YAML document with environment overrides

pub mod assembler;
pub mod config;
pub mod errors;
pub mod executors;
pub mod provisioner;
pub mod registry;
pub mod runner;

pub use assembler::assemble;
pub use config::{ConfigLoader, FragrunConfig, IsolationMode};
pub use errors::ExecutionError;
pub use executors::{RunResult, RunStatus, Sandbox};
pub use provisioner::{ProvisionReport, Provisioner};
pub use registry::{FileRegistry, Fragment, MemoryRegistry, RegistryStore, UpsertOutcome};
pub use runner::Runner;
