//! # teslog-core
//!
//! Turns a stream of vehicle telemetry snapshots into discrete sessions
//! (driving, charging, conditioning, parked) with per-kind metrics.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The only blocking point is whatever
//!   reader or collaborator the caller hands in.
//! - **Per-vehicle state**: One [`SessionTracker`] per vehicle stream; nothing
//!   is process-global.
//! - **Skip, don't fail**: Malformed or ineligible input lines are skips.
//!   Errors are reserved for collaborator failures and contract violations.
//! - **Collaborators behind traits**: Geolocation ([`Locate`]), the durable
//!   store ([`SessionStore`]) and archival sinks ([`RecordSink`]) are
//!   implemented by the binary.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use teslog_core::{CoordinateLocator, Pipeline, PipelineOptions};
//!
//! let stdout = std::io::stdout();
//! let mut pipeline = Pipeline::new(PipelineOptions::default(), &CoordinateLocator, stdout.lock());
//! pipeline.run(std::io::stdin().lock())?;
//! pipeline.finish()?;
//! ```

pub mod error;
pub mod locate;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod session;
pub mod sink;
pub mod store;
pub mod tracker;
pub mod zone;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, TeslogError};
pub use locate::{
    tile_for, CachedLocator, CoordinateLocator, GeoCache, GeocodeError, Geocoder, Locate,
    MemoryGeoCache, Place, Tile, DEFAULT_ZOOM, NOT_IN_DATA, SKIPPED,
};
pub use pipeline::{Pipeline, PipelineOptions, PipelineStats, DEFAULT_GAP_ALERT_SECS};
pub use record::{normalize, NormalizeOptions, Normalized, Record, SkipReason, VehicleInfo};
pub use report::format_session;
pub use session::{Session, SessionDetail, UNKNOWN_VEHICLE};
pub use sink::{RecordSink, StreamSink};
pub use store::{MemoryStore, SessionStore};
pub use tracker::{CarryOver, SessionEvent, SessionTracker};
pub use zone::{format_duration, DisplayZone};
