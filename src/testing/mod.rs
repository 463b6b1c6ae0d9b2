//! Testing infrastructure for daybook.
//!
//! Mock collaborators, a wired-up [`Harness`], record builders and
//! timeline assertions, usable from unit tests and from `tests/`.
//!
//! # Example
//!
//! ```rust,ignore
//! use daybook::testing::{Harness, MockRoutineSource, routine};
//!
//! let harness = Harness::new();
//! let aggregator = harness.aggregator(
//!     MockTaskSource::new(),
//!     MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
//!     MockCalendarSource::new(),
//! );
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::*;
pub use fixtures::*;
pub use mocks::*;
