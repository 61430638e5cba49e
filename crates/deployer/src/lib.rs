#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`DeployerError`)
//! - [`docker`]: Docker API abstraction (`DockerClient` trait, `BollardDockerClient`)
//! - [`catalog`]: Static service definitions (`ServiceDefinition`)
//! - [`assets`]: Secrets, certificates and rendered config files (`AssetGenerator`)
//! - [`plan`]: Service selection and ordering (`DeploymentPlan`)
//! - [`probe`]: Readiness probes (`Probe`, `Prober`, `LiveProber`)
//! - [`wait`]: Readiness polling (`WaitPolicy`, `wait_for_service`)
//! - [`deployer`]: Main orchestrator (`Deployer`)
//! - [`verify`]: Post-deploy verification (`Verifier`)
//! - [`report`]: Access URLs and credentials (`AccessReport`)
//!
//! # Architecture
//!
//! ```text
//! BtpiConfig + mode + services
//!          |
//!     DeploymentPlan::resolve()
//!          |
//!     AssetGenerator::prepare()   (.env, certs/, config/<service>/)
//!          |
//!     Deployer::deploy()  --DockerClient-->  Docker daemon
//!          |
//!     wait_for_service()  --Prober-->  HTTP / TCP / exec
//!          |
//!     Verifier::verify() / AccessReport::build()
//! ```

pub mod assets;
pub mod catalog;
pub mod deployer;
pub mod docker;
pub mod error;
pub mod plan;
pub mod probe;
pub mod report;
pub mod verify;
pub mod wait;

// --- Public API Re-exports ---

// Orchestrator
pub use deployer::{
    DeployAction, DeployFailure, DeployOptions, Deployer, DeploymentReport, ServiceOutcome,
    ServiceStatus, TeardownFailure, TeardownReport,
};

// Error
pub use error::DeployerError;

// Docker API
pub use docker::{
    BollardDockerClient, ContainerSpec, DockerClient, ExecOutput, ManagedContainer, PortMapping,
};

// Planning and assets
pub use assets::{AssetGenerator, AssetReport};
pub use plan::DeploymentPlan;

// Readiness
pub use probe::{LiveProber, Probe, ProbeOutcome, Prober, RenderedProbe};
pub use wait::{ReadyInfo, WaitPolicy, wait_for_service};

// Verification and reporting
pub use report::{AccessEntry, AccessReport};
pub use verify::{CheckResult, VerificationReport, Verifier};
