//! User-provided component shapes the core consumes (§6). Concrete
//! implementations (file readers, histogrammers, physics factories) are
//! external collaborators; only these contracts live in the core.

use crate::errors::EngineResult;
use crate::event::Event;

/// What a [`Source::emit`] call reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Success,
    TryAgain,
    Finished,
}

/// No-input, one-output component driving an Event through the topology.
pub trait Source: Send + Sync {
    fn open(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn emit(&mut self, event: &Event) -> EngineResult<SourceStatus>;

    fn close(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// One-input, one-output per-event transform. `process_parallel` runs
/// unlocked and concurrently with any number of workers; `process_sequential`
/// runs under the owning arrow's sequential-section lock, so "expert"
/// processors can do the bulk of their work in parallel and serialise only
/// the part that needs it (e.g. a shared histogram fill). A "legacy"
/// processor implements only `process_sequential`.
pub trait Processor: Send + Sync {
    fn process_parallel(&self, _event: &Event) -> EngineResult<()> {
        Ok(())
    }

    fn process_sequential(&self, _event: &Event) -> EngineResult<()> {
        Ok(())
    }
}

/// What an [`Unfolder::unfold`] call reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfoldStatus {
    NextChildReady,
    FinishedWithParent,
}

/// For each parent Event, emits a sequence of child Events with their
/// parent link already set by the arrow; the unfolder only decides whether
/// another child is ready or the parent is exhausted.
pub trait Unfolder: Send + Sync {
    fn unfold(&mut self, parent: &Event, child: &Event) -> EngineResult<UnfoldStatus>;
}

/// What a [`Folder::fold`] call reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldStatus {
    KeepAccumulating,
    Complete,
}

/// Inverse of [`Unfolder`]: accumulates children into a parent until a
/// completion condition, at which point the arrow emits the parent
/// downstream and returns its children to the pool.
pub trait Folder: Send + Sync {
    fn fold(&mut self, parent: &Event, child: &Event) -> EngineResult<FoldStatus>;
}
