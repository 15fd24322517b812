//! Replication Module
//!
//! Startup bootstrap of master/replica replication. Once bootstrap has run,
//! replication proceeds asynchronously inside the database servers; this
//! process neither monitors nor repairs it.

mod bootstrap;

pub use bootstrap::{
    BootstrapReport, BootstrapSettings, ReplicationBootstrapper, Step, StepOutcome,
};
