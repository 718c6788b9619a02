use crate::router::{Route, Target};
use std::collections::BTreeMap;
use tributary_core::{error::Result, Position};

/// What applying one change did to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written to the store (including any buffered children it released)
    Applied,
    /// Parked in the pending-dependency buffer
    Deferred,
    /// Not for this projection
    Ignored,
}

/// A target store fed by routed changes
///
/// Implementations own their pending-dependency buffer, so `apply` takes
/// `&mut self` and a projection is driven by exactly one loop.
pub trait Projection: Send {
    fn target(&self) -> Target;

    /// Fold one change into the store. An error leaves the change
    /// unapplied; re-applying it later is safe.
    ///
    /// `source` is where the change was read from. A deferred change keeps
    /// it so [`held_offsets`](Self::held_offsets) can report it.
    fn apply(&mut self, route: Route, source: Option<&Position>) -> Result<Outcome>;

    /// Children still waiting for their parent
    fn pending(&self) -> usize;

    /// Oldest offset per `(topic, partition)` that is still buffered
    fn held_offsets(&self) -> BTreeMap<(String, i32), i64>;
}
