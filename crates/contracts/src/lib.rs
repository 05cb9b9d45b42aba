//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline crate.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data model
//! - Stages exchange values through [`PipelineState`], keyed by the names
//!   declared in each [`StageDescriptor`]
//! - Hosted models are reached only through [`ModelClient`]
//! - Runs end in an [`AggregatedReport`] handed to [`ReportSink`]s

mod blueprint;
mod error;
mod financial;
mod model;
mod referral;
mod report;
mod stage;
mod state;

pub use blueprint::*;
pub use error::*;
pub use financial::*;
pub use model::*;
pub use referral::*;
pub use report::*;
pub use stage::*;
pub use state::PipelineState;
