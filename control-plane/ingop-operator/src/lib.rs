pub mod cluster;
pub mod config;
pub mod controllers;
pub mod convergence;
pub mod driver;
pub mod error;
pub mod events;
pub mod kinds;
pub mod logging;
pub mod loglevel;
pub mod operator;
pub mod retry;
pub mod topology;

pub use convergence::{Converge, ConvergeAction, ReconcileOutcome, ensure};
pub use error::{ReconcileError, ReconcileResult};
pub use logging::{FilterHandle, init_tracing};
pub use operator::Operator;
