//! Connection Protocol
//!
//! Edges run from an [`Output`] to an [`Input`]. An output may feed any number
//! of inputs; an input reads from at most one output.
//!
//! Each operation locks the execution managers of the nodes on both ends of
//! the edge (if any) for its duration, so rewiring never interleaves with a
//! running tick. An unmanaged reader attached to a managed writer is covered
//! by the writer's manager. The manager mutex is reentrant; callers that
//! already hold it may call these functions freely.
//!
//! Connecting does not trigger the downstream node. If the output already has
//! a defined value the input can read it immediately, but the node only
//! recomputes on the next [`Output::set_value`].

use std::sync::Arc;

use tracing::debug;

use super::{Input, Output};
use crate::error::{Error, Result};
use crate::system::{with_edge_lock, with_manager_lock};

/// Connect `input` to `output`.
///
/// Fails with [`Error::AlreadyConnected`] if the input already references an output.
pub fn connect<T: Send + 'static>(output: &Output<T>, input: &Input<T>) -> Result<()> {
    with_edge_lock(&input.core.owner, &output.core.owner, || {
        let mut slot = input.core.output.lock();
        if slot.is_some() {
            return Err(Error::AlreadyConnected);
        }
        output.core.attach_input(&input.core);
        *slot = Some(Arc::clone(&output.core));

        debug!(
            from = %output.core.owner_name(),
            to = %input.owner_name(),
            "connected"
        );
        Ok(())
    })
}

/// Disconnect `input` from whatever output it references.
///
/// Fails with [`Error::NotConnected`] if the input was not connected.
pub fn disconnect<T: Send + 'static>(input: &Input<T>) -> Result<()> {
    let writer = input
        .core
        .output
        .lock()
        .as_ref()
        .map(|output| output.owner.clone());
    let writer = writer.unwrap_or_else(|| input.core.owner.clone());
    with_edge_lock(&input.core.owner, &writer, || {
        let previous = input.core.output.lock().take();
        let output = previous.ok_or(Error::NotConnected)?;
        output.detach_input(Arc::as_ptr(&input.core));

        debug!(
            from = %output.owner_name(),
            to = %input.owner_name(),
            "disconnected"
        );
        Ok(())
    })
}

/// Rebind an already connected `input` to `new_output` in one step.
///
/// Fails with [`Error::NotConnected`] if the input was not connected; use
/// [`connect`] for a first connection.
pub fn reconnect<T: Send + 'static>(new_output: &Output<T>, input: &Input<T>) -> Result<()> {
    with_edge_lock(&input.core.owner, &new_output.core.owner, || {
        let mut slot = input.core.output.lock();
        let previous = slot.take().ok_or(Error::NotConnected)?;
        previous.detach_input(Arc::as_ptr(&input.core));
        new_output.core.attach_input(&input.core);
        *slot = Some(Arc::clone(&new_output.core));

        debug!(
            from = %previous.owner_name(),
            to = %new_output.core.owner_name(),
            input = %input.owner_name(),
            "reconnected"
        );
        Ok(())
    })
}

/// Connect `input` to `output`, replacing any existing connection.
///
/// Never fails on the connection state, which makes it suitable for
/// idempotent rewiring at runtime.
pub fn force_connect<T: Send + 'static>(output: &Output<T>, input: &Input<T>) {
    with_edge_lock(&input.core.owner, &output.core.owner, || {
        let mut slot = input.core.output.lock();
        if let Some(previous) = slot.take() {
            previous.detach_input(Arc::as_ptr(&input.core));
        }
        output.core.attach_input(&input.core);
        *slot = Some(Arc::clone(&output.core));
    });
    debug!(
        from = %output.core.owner_name(),
        to = %input.owner_name(),
        "force connected"
    );
}

/// Disconnect every input fed directly by `output`.
///
/// Fails with [`Error::NotConnected`] if no input was connected. Outputs
/// delegating to `output` are left alone.
pub fn disconnect_output<T: Send + 'static>(output: &Output<T>) -> Result<()> {
    with_manager_lock(&output.core.owner, || {
        let inputs = output.core.take_inputs();
        if inputs.is_empty() {
            return Err(Error::NotConnected);
        }
        let released = inputs
            .iter()
            .filter_map(std::sync::Weak::upgrade)
            .inspect(|input| input.clear_if_connected_to(Arc::as_ptr(&output.core)))
            .count();

        debug!(
            from = %output.core.owner_name(),
            inputs = released,
            "output disconnected"
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionManager, ManualExecutionManager};
    use crate::system::{Node, Ports, System};
    use std::sync::mpsc;
    use std::time::Duration;

    struct Relay {
        input: Input<i32>,
        output: Output<i32>,
    }

    impl Relay {
        fn new(ports: &Ports) -> Self {
            Self {
                input: ports.input(),
                output: ports.output(),
            }
        }
    }

    impl System for Relay {
        fn operate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn relay(name: &str) -> (Node<Relay>, Input<i32>, Output<i32>) {
        let node = Node::new(name, Relay::new);
        let (input, output) = {
            let relay = node.lock();
            (relay.input.clone(), relay.output.clone())
        };
        (node, input, output)
    }

    #[test]
    fn second_connect_fails() {
        let (_a, _, out_a) = relay("a");
        let (_b, _, out_b) = relay("b");
        let (_c, in_c, _) = relay("c");

        connect(&out_a, &in_c).unwrap();
        assert!(matches!(connect(&out_b, &in_c), Err(Error::AlreadyConnected)));

        disconnect(&in_c).unwrap();
        connect(&out_b, &in_c).unwrap();
        assert_eq!(out_a.num_inputs(), 0);
        assert_eq!(out_b.num_inputs(), 1);
    }

    #[test]
    fn disconnect_unconnected_fails() {
        let (_a, in_a, _) = relay("a");
        assert!(matches!(disconnect(&in_a), Err(Error::NotConnected)));
    }

    #[test]
    fn reconnect_requires_existing_connection() {
        let (_a, _, out_a) = relay("a");
        let (_b, _, out_b) = relay("b");
        let (_c, in_c, _) = relay("c");

        assert!(matches!(reconnect(&out_a, &in_c), Err(Error::NotConnected)));
        assert!(!in_c.is_connected());

        connect(&out_a, &in_c).unwrap();
        reconnect(&out_b, &in_c).unwrap();
        assert!(!out_a.is_connected());
        assert!(out_b.is_connected());
    }

    #[test]
    fn force_connect_is_idempotent() {
        let (_a, _, out_a) = relay("a");
        let (_b, _, out_b) = relay("b");
        let (_c, in_c, _) = relay("c");

        force_connect(&out_a, &in_c);
        force_connect(&out_a, &in_c);
        assert_eq!(out_a.num_inputs(), 1);

        force_connect(&out_b, &in_c);
        assert_eq!(out_a.num_inputs(), 0);
        assert_eq!(out_b.num_inputs(), 1);
    }

    #[test]
    fn connecting_to_defined_output_is_immediately_readable() {
        let (_a, _, out_a) = relay("a");
        let (_b, in_b, _) = relay("b");

        out_a.set_value(7).unwrap();
        assert!(!in_b.value_defined());

        connect(&out_a, &in_b).unwrap();
        assert!(in_b.value_defined());
        assert_eq!(in_b.get_value().unwrap(), 7);
    }

    #[test]
    fn disconnect_output_releases_all_inputs() {
        let (_a, _, out_a) = relay("a");
        let (_b, in_b, _) = relay("b");
        let (_c, in_c, _) = relay("c");

        assert!(matches!(disconnect_output(&out_a), Err(Error::NotConnected)));

        connect(&out_a, &in_b).unwrap();
        connect(&out_a, &in_c).unwrap();
        disconnect_output(&out_a).unwrap();

        assert!(!in_b.is_connected());
        assert!(!in_c.is_connected());
        assert!(!out_a.is_connected());
    }

    #[test]
    fn unmanaged_reader_waits_for_the_writers_manager() {
        let (writer, _, out_w) = relay("writer");
        let (_reader, in_r, _) = relay("reader");
        let mut manager = ManualExecutionManager::new();
        manager.start_managing(&writer).unwrap();

        let (done, finished) = mpsc::channel();
        let guard = manager.lock();
        let wiring = std::thread::spawn(move || {
            connect(&out_w, &in_r).unwrap();
            done.send(()).unwrap();
        });

        assert!(finished.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        assert!(finished.recv_timeout(Duration::from_secs(5)).is_ok());
        wiring.join().unwrap();
    }
}
