//! Sonoran core: backend services, the operation catalogue and payload
//! shaping.
//!
//! Everything here is pure data and pure functions. Dispatch, rate limiting
//! and HTTP live in `sonoran-client`.

pub mod catalogue;
pub mod payload;
pub mod service;
pub mod shaping;

pub use catalogue::{find, find_for, Method, Operation, OperationDescriptor, CATALOGUE};
pub use payload::{resolve, ResolveContext, ResolveError, WireRequest};
pub use service::{Convention, Credentials, Service};
pub use shaping::{shaping, ArgLayout, PathRoute, Shaping};
