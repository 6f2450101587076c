//! Service Layer
//!
//! Business logic behind the HTTP handlers. Handlers stay thin: decode,
//! call into [`ControlPlane`], encode.

mod control_plane;

pub use control_plane::*;
