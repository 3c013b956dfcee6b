//! # ccd-id
//!
//! Typed identifiers for the dispatcher.
//!
//! Every identifier is a ULID behind a short resource prefix: `{prefix}_{ulid}`.
//!
//! - `app_01HV4Z3MXNKPQR9HSTZ7WCLD4E` names an application record
//! - `stg_01HV4Z4NYPLTRS0JTUA8XDME5F` names one staging attempt
//! - `msg_01HV4Z2WQXKJNM8GPQY6VBKC3D` names one bus message
//!
//! Staging task ids are generated per stage request and travel through the
//! scheduler and back on the completion notification, so a completion can be
//! matched against the attempt that is current for the application. Because
//! ULIDs are time-ordered, a later attempt always compares greater than an
//! earlier one generated by the same process.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
