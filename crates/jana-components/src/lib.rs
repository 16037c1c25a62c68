//! jana-components: shapes of the user-provided components the core
//! consumes (§6) plus minimal, fully working demo implementations used by
//! the integration tests for the scenarios in spec.md §8.
//!
//! The trait contracts themselves (`Source`, `Processor`, `Unfolder`,
//! `Folder`, `Factory`) live in `jana_core`; this crate only adds concrete
//! bodies, the way `chem-adapters::steps` provides worked examples of
//! `chem-core`'s `StepDefinition` contract.

pub mod demo;
