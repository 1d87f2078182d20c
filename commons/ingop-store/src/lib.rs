pub mod error;
pub mod resource;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "kube")]
pub mod k8s;

pub use error::*;
pub use resource::*;
pub use traits::*;
