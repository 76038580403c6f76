//! Node context injection for multi-node logging
//!
//! A simulation steps many nodes on one thread. [`NodeContextGuard`] records
//! which node is currently being stepped so that every span opened inside the
//! scope can be attributed to it.

use std::cell::RefCell;

use encounter_core::PeerIdentity;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContextData {
    /// The node's identity as a string
    pub node_id: String,
    /// Group prefix of the node, if its identity has one
    pub group: Option<char>,
    /// Unique instance ID for this node session
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread; dropping
/// it restores whatever context was active before.
///
/// # Example
///
/// ```ignore
/// use encounter_logging::context::NodeContextGuard;
/// use encounter_core::NodeId;
///
/// let _guard = NodeContextGuard::new(&NodeId::node(30));
///
/// // Spans opened in this scope carry node_id = "n30"
/// tracing::info_span!("tick").in_scope(|| tracing::debug!("forwarding"));
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Set the context for `identity` with a fresh instance ID
    pub fn new<I: PeerIdentity>(identity: &I) -> Self {
        Self::with_instance_id(identity, Uuid::new_v4())
    }

    /// Set the context with a specific instance ID
    ///
    /// Lets a driver keep one instance ID per node across many scopes.
    pub fn with_instance_id<I: PeerIdentity>(identity: &I, instance_id: Uuid) -> Self {
        let previous = Self::current();

        let new_ctx = NodeContextData {
            node_id: identity.short_id(),
            group: identity.group(),
            instance_id,
        };

        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node ID (if set)
    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to run a block under a node context
///
/// # Example
///
/// ```ignore
/// with_node_context!(&node, {
///     scheduler.tick(&mut host, now);
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($identity:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($identity);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_core::NodeId;

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());

        {
            let _guard = NodeContextGuard::new(&NodeId::node(30));

            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node_id, "n30");
            assert_eq!(ctx.group, Some('n'));
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let a = NodeId::node(1);
        let b = NodeId::new('c', 2);

        {
            let _guard_a = NodeContextGuard::new(&a);
            assert_eq!(NodeContextGuard::current_node_id(), Some("n1".to_string()));

            {
                let _guard_b = NodeContextGuard::new(&b);
                assert_eq!(NodeContextGuard::current_node_id(), Some("c2".to_string()));
            }

            // Restored to the outer node
            assert_eq!(NodeContextGuard::current_node_id(), Some("n1".to_string()));
        }

        assert!(NodeContextGuard::current_node_id().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();

        {
            let _guard = NodeContextGuard::with_instance_id(&NodeId::node(7), instance_id);
            assert_eq!(NodeContextGuard::current_instance_id(), Some(instance_id));
        }
    }

    #[test]
    fn test_macro_scopes_context() {
        let node = NodeId::node(4);
        let seen = with_node_context!(&node, { NodeContextGuard::current_node_id() });
        assert_eq!(seen, Some("n4".to_string()));
        assert!(NodeContextGuard::current().is_none());
    }
}
