//! jana-core: the parallel execution engine at the heart of JANA2-rs.
//!
//! Provides the directed graph of arrows, the event pool, inter-arrow
//! mailboxes, the worker-assignment scheduler, the lazy per-event
//! factory-execution sub-engine and its call-graph bookkeeping, and the
//! lifecycle/termination protocol that ties them together.
//!
//! Components, leaves first: [`event`] (Event, parent chain), [`factory`]
//! (FactorySet & Factory state machine), [`callgraph`] (cycle detection and
//! topological replay), [`pool`] (EventPool), [`queue`] (the bounded
//! Mailbox), [`arrow`] (the five arrow kinds), [`topology`] (wiring and
//! activation propagation), [`scheduler`] (worker assignment), [`worker`]
//! (the per-thread loop), [`engine`] (the top-level `ExecutionEngine`).
//!
//! Concrete detector/physics components, file/socket readers, and parameter
//! parsing are external collaborators — only their trait contracts
//! ([`arrow::Source`], [`arrow::Processor`], [`arrow::Unfolder`],
//! [`arrow::Folder`], [`factory::Factory`]) live in this crate.

pub mod arrow;
pub mod backoff;
pub mod callgraph;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod factory;
pub mod identity;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod topology;
pub mod worker;

pub use arrow::{Arrow, FireResult, Folder, FoldStatus, Processor, Source, SourceStatus, Unfolder, UnfoldStatus};
pub use backoff::BackoffStrategy;
pub use callgraph::{CallGraphRecorder, CallOrigin};
pub use engine::{Affinity, ArrowPerf, BacktraceCapture, EngineConfig, ExecutionEngine, ExitCode, PerfSummary, StopMode};
pub use errors::{EngineError, EngineResult};
pub use event::{Event, EventHandle, ObjectHook};
pub use factory::{Factory, FactorySet, FactoryState};
pub use identity::{EventIdentity, Level};
pub use metrics::{ArrowMetrics, Outcome, WorkerMetrics};
pub use pool::EventPool;
pub use queue::Queue;
pub use scheduler::{PriorOutcome, Scheduler};
pub use topology::{Edge, Topology};
pub use worker::{PauseGate, Worker};
