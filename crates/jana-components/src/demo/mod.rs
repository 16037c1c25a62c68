//! Worked examples of the core's component contracts: a counting source, a
//! pass-through processor, a counting sink, and a parent/child
//! unfold/fold pair.

mod folder;
mod processor;
mod sink;
mod source;
mod unfolder;

pub use folder::ChildCountFolder;
pub use processor::PassThroughProcessor;
pub use sink::CountingSink;
pub use source::CountingSource;
pub use unfolder::ChildCountUnfolder;
