//! # blocksync testkit
//!
//! Testing utilities for blocksync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: temporary extents with known contents
//! - **Generators**: proptest strategies for block sizes, worker counts and
//!   source/destination pairs
//!
//! ## Test Fixtures
//!
//! ```rust
//! use blocksync_testkit::fixtures::{patterned, ExtentFixture};
//!
//! let fixture = ExtentFixture::new();
//! let source = fixture.write("source.img", &patterned(4096, 7));
//! let dest = fixture.zeroed("dest.img", 4096);
//! assert_ne!(fixture.read(&source), fixture.read(&dest));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use blocksync_testkit::generators::Scenario;
//!
//! proptest! {
//!     #[test]
//!     fn dest_converges(scenario: Scenario) {
//!         // run a session over scenario.source / scenario.dest
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{differing_blocks, mutate_blocks, nonzero_blocks, patterned, ExtentFixture};
pub use generators::Scenario;
