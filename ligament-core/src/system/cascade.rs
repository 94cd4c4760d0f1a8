//! Propagation Cascade
//!
//! The cascade tracks which nodes are currently executing on this thread.
//! Publishing a value runs downstream nodes on the same call stack, so the
//! stack of executing nodes is exactly the path the push has taken through
//! the graph. Re-entering a node already on that path means the wiring
//! contains a cycle.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per executing node. Entering a node
//! pushes its id; the returned guard pops it, even if `operate()` panics.
//! Nested entries are normal: a node publishing an output runs its
//! dependents inside its own frame.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::NodeId;
use crate::error::{Error, Result};

thread_local! {
    static CASCADE_STACK: RefCell<SmallVec<[NodeId; 16]>> = RefCell::new(SmallVec::new());
}

/// Guard marking a node as executing on the current thread.
pub(crate) struct CascadeFrame {
    node: NodeId,
}

impl CascadeFrame {
    /// Push `node` onto the cascade.
    ///
    /// Fails with [`Error::CycleDetected`] if the node is already executing
    /// further up this thread's stack.
    pub(crate) fn enter(node: NodeId, name: &str) -> Result<Self> {
        CASCADE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&node) {
                return Err(Error::CycleDetected {
                    node: name.to_owned(),
                });
            }
            stack.push(node);
            Ok(Self { node })
        })
    }

    /// Number of nodes executing on this thread.
    pub(crate) fn depth() -> usize {
        CASCADE_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for CascadeFrame {
    fn drop(&mut self) {
        CASCADE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.node),
                "cascade frames must be released in reverse order"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_nest_and_unwind() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        assert_eq!(CascadeFrame::depth(), 0);
        {
            let _outer = CascadeFrame::enter(outer, "outer").unwrap();
            assert_eq!(CascadeFrame::depth(), 1);
            {
                let _inner = CascadeFrame::enter(inner, "inner").unwrap();
                assert_eq!(CascadeFrame::depth(), 2);
            }
            assert_eq!(CascadeFrame::depth(), 1);
        }
        assert_eq!(CascadeFrame::depth(), 0);
    }

    #[test]
    fn reentering_a_node_is_a_cycle() {
        let node = NodeId::new();
        let _frame = CascadeFrame::enter(node, "loop").unwrap();

        match CascadeFrame::enter(node, "loop") {
            Err(Error::CycleDetected { node }) => assert_eq!(node, "loop"),
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
        // The failed entry must not have pushed anything.
        assert_eq!(CascadeFrame::depth(), 1);
    }
}
