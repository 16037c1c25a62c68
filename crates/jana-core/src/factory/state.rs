/// Lifecycle state of a single `(type, tag)` factory attached to one Event.
///
/// ```text
/// Empty ──Init─▶ Initialized ──Process─▶ Processed ──Clear──▶ Empty
///                     ▲            │
///                     └─Insert─────┤
///                                  ▼
///                              Inserted ──Clear──▶ Empty
/// ```
///
/// State never goes backwards within a single Event's lifetime except via
/// `Clear`, which respects the persistent flag (see [`super::FactorySet`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    Empty,
    Initialized,
    Processed,
    Inserted,
}

impl FactoryState {
    /// Already holds data that `Get` can return directly.
    pub fn has_output(self) -> bool {
        matches!(self, FactoryState::Processed | FactoryState::Inserted)
    }
}
