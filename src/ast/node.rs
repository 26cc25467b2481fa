use rand::Rng;

/// Identity of an expression node. Ids are stable across the rewrite pass;
/// the partial-application tracker and constraint locators key on them.
pub type NodeId = u64;

pub fn next_node_id() -> NodeId {
    let mut rng = rand::thread_rng();
    rng.gen::<u64>()
}
