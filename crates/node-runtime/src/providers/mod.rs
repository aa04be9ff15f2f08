//! Provider adapters.
//!
//! Each adapter implements [`Runtime`](crate::Runtime) for one cloud vendor and
//! owns that vendor's error mapping.

pub mod lambdalabs;
