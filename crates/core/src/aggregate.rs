//! Aggregate root trait for versioned domain documents.

/// Aggregate root marker + minimal interface.
///
/// Kept small so each module decides how it models state transitions
/// (pure functions returning the records to persist) without bringing in any
/// infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's content.
    ///
    /// For quotes this is the current document version number (starts at 1).
    fn version(&self) -> u64;
}
