//! Upload destinations for swiftslo.
//!
//! This crate defines the [`Destination`] capability that the upload
//! pipeline is written against, together with:
//!
//! - [`SwiftDestination`] - OpenStack Swift over HTTP (streamed object
//!   bodies, SLO and DLO manifest endpoints, container listings)
//! - [`mock`] - in-memory destinations for tests: buffer, null, and
//!   always-erroring
//!
//! # Example
//!
//! ```ignore
//! use swiftslo_destination::{Destination, SwiftDestination};
//!
//! let dest = SwiftDestination::new(storage_url, auth_token)?;
//! let names = dest.file_names("backups").await?;
//! ```

mod destination;
mod error;
pub mod mock;
mod swift;

pub use destination::{Destination, ObjectRecord, ObjectWriter};
pub use error::DestinationError;
pub use swift::SwiftDestination;
