use crate::error::Result;
use crate::types::{Direction, EndpointPolicy, NodeRef, Properties, RelType};

/// Property-graph store
///
/// Every write is a merge or a match-then-mutate, so re-applying the same
/// change leaves the graph unchanged. At most one relationship of a given
/// type exists between two nodes.
pub trait GraphStore: Send + Sync {
    /// Create the node if absent, then set the given properties. Properties
    /// not named in `props` are left as they are.
    fn merge_node(&self, node: NodeRef, props: &Properties) -> Result<()>;

    fn node(&self, node: NodeRef) -> Result<Option<Properties>>;

    fn node_exists(&self, node: NodeRef) -> Result<bool>;

    /// Delete the node and every relationship touching it. Returns whether
    /// the node existed.
    fn detach_delete(&self, node: NodeRef) -> Result<bool>;

    /// Merge the relationship. Returns `false` when an endpoint is missing
    /// under [`EndpointPolicy::RequireExisting`].
    fn merge_edge(
        &self,
        rel: RelType,
        from: NodeRef,
        to: NodeRef,
        policy: EndpointPolicy,
    ) -> Result<bool>;

    /// Delete the relationship. Returns whether it existed.
    fn delete_edge(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<bool>;

    /// Delete `rel` relationships on `node` in `direction` whose other end is
    /// not `keep`. Returns the number removed.
    fn delete_edges_except(
        &self,
        rel: RelType,
        node: NodeRef,
        direction: Direction,
        keep: NodeRef,
    ) -> Result<usize>;

    fn edge_count(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<usize>;

    /// All relationships of one type, ordered by endpoints
    fn edges(&self, rel: RelType) -> Result<Vec<(NodeRef, NodeRef)>>;
}
