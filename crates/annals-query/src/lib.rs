//! Time-window filters and resampling over snapshot histories.
//!
//! The [`Series`] type is the explicit snapshot-collection abstraction:
//! it borrows a subject's history (as produced by the snapshot log),
//! filters it by creation time, and downsamples it into fixed-width
//! buckets. Nothing here mutates history -- every operation returns a new
//! series of borrowed snapshots.
//!
//! Month and year windows are fixed approximations by convention --
//! a month is 28 days (4 weeks), a year is 365 days -- not calendar
//! arithmetic.

pub mod series;

pub use series::{Bucket, Series};
