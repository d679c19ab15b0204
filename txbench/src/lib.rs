#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod workload;

pub(crate) mod rate;
pub(crate) mod scheduler;
pub(crate) mod state;
pub(crate) mod worker;

pub use scheduler::{AbortHandle, Bench};
pub use workload::{Connection, Workload};

pub use txbench_core as core;

pub mod prelude {
    pub use crate::scheduler::{AbortHandle, Bench};
    pub use crate::workload::{Connection, Workload};
    pub use txbench_core::{
        Arrival, BackendFault, BenchConfig, ConfigError, FaultTable, LatencySummary, PhaseConfig,
        RunReport, TransactionDef, TransactionStatus, TransactionType, WorkError,
    };
}
