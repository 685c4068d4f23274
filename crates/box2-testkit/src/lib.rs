//! # box2 Testkit
//!
//! Testing utilities for box2.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: [`TestActor`] engines, an in-memory [`FakeForest`] and a
//!   counting [`RecordingReindexer`]
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Forest Monitoring
//!
//! ```rust,ignore
//! use box2_testkit::fixtures::{ActorTree, FakeForest, RecordingReindexer, TestActor};
//!
//! let alice = TestActor::tree().await?;
//! let forest = FakeForest::new();
//! forest.push_all(ActorTree::generate().owned_branches());
//!
//! let reindexer = RecordingReindexer::new();
//! let monitor = alice.engine.spawn_forest_monitor(forest.clone(), reindexer.clone());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use box2_testkit::generators::recipient_plan;
//!
//! proptest! {
//!     #[test]
//!     fn every_recipient_decrypts(plan in recipient_plan()) {
//!         // build one actor per slot, seal once, open with each
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    eventually, ActorTree, FakeForest, RecordingReindexer, TestActor, DM_PURPOSE, SHARD_PURPOSE,
};
pub use generators::RecipientPlan;
