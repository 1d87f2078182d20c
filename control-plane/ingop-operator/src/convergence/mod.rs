//! Generic desired-state convergence: compare what exists against what
//! should exist and close the gap with one create, update or delete.

pub mod compare;
mod ensure;

pub use compare::{FieldOwnership, SpecOwnership, compare, diff, equate_empty};
pub use ensure::{Converge, ConvergeAction, ReconcileOutcome, ensure};
