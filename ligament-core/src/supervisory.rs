//! Supervisory Control
//!
//! A [`SupervisoryController`] multiplexes several candidate control sources
//! onto one actuation sink, such as the torque input of an arm. Each
//! candidate is a [`Controllable`]: a reference input that accepts a
//! setpoint signal, and a control output producing the sink's signal type.
//!
//! # Switching
//!
//! [`track_reference_signal`](SupervisoryController::track_reference_signal)
//! picks a controllable, feeds the reference signal into it, and rebinds the
//! sink to its control output. Rebinding replaces the sink's single upstream
//! reference in one step, so the sink is never undriven and never driven by
//! two controllables at once. Both rewiring steps happen under the sink's
//! manager lock, so a running tick sees either the old wiring or the new one.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::port::{force_connect, Input, Output};
use crate::system::with_manager_lock;

/// Index of a controllable within its supervisory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllableId(usize);

impl ControllableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A candidate control source: a reference input of any type and a control
/// output of the sink's type `U`.
pub struct Controllable<U> {
    name: String,
    reference_type: TypeId,
    reference_type_name: &'static str,
    reference_input: Box<dyn Any + Send + Sync>,
    control_output: Output<U>,
}

impl<U: Send + 'static> Controllable<U> {
    pub fn new<R: Send + 'static>(
        name: impl Into<String>,
        reference_input: Input<R>,
        control_output: Output<U>,
    ) -> Self {
        Self {
            name: name.into(),
            reference_type: TypeId::of::<R>(),
            reference_type_name: type_name::<R>(),
            reference_input: Box::new(reference_input),
            control_output,
        }
    }

    /// Name used in logs and in mismatch errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the reference signal this controllable accepts.
    pub fn reference_type_name(&self) -> &'static str {
        self.reference_type_name
    }

    /// The output routed into the sink while this controllable is active.
    pub fn control_output(&self) -> &Output<U> {
        &self.control_output
    }

    /// The reference input, if it carries `R`.
    pub fn reference_input<R: Send + 'static>(&self) -> Option<&Input<R>> {
        self.reference_input.downcast_ref()
    }

    fn accepts<R: 'static>(&self) -> bool {
        self.reference_type == TypeId::of::<R>()
    }

    /// Whether `source` is this controllable's own control output.
    fn produces<R>(&self, source: &Output<R>) -> bool {
        std::ptr::addr_eq(
            Arc::as_ptr(&self.control_output.core),
            Arc::as_ptr(&source.core),
        )
    }
}

impl<U: Send + 'static> fmt::Debug for Controllable<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controllable")
            .field("name", &self.name)
            .field("reference_type", &self.reference_type_name)
            .finish()
    }
}

/// Routes exactly one controllable at a time into a sink input.
///
/// # Example
///
/// ```rust,ignore
/// let mut supervisor = SupervisoryController::new(&wam.lock().torque);
/// let joint = {
///     let pid = joint_pid.lock();
///     supervisor.register_controllable(Controllable::new(
///         "joint position",
///         pid.reference.clone(),
///         pid.torque.clone(),
///     ))
/// };
/// supervisor.track_reference_signal(&trajectory.lock().position, None)?;
/// ```
pub struct SupervisoryController<U> {
    sink: Input<U>,
    controllables: Vec<Controllable<U>>,
    active: Option<ControllableId>,
}

impl<U: Send + 'static> SupervisoryController<U> {
    pub fn new(sink: &Input<U>) -> Self {
        Self {
            sink: sink.clone(),
            controllables: Vec::new(),
            active: None,
        }
    }

    /// Add a candidate. Earlier registrations are searched first.
    pub fn register_controllable(&mut self, controllable: Controllable<U>) -> ControllableId {
        let id = ControllableId(self.controllables.len());
        debug!(
            controllable = %controllable.name,
            reference = controllable.reference_type_name,
            "controllable registered"
        );
        self.controllables.push(controllable);
        id
    }

    pub fn controllable(&self, id: ControllableId) -> Option<&Controllable<U>> {
        self.controllables.get(id.0)
    }

    pub fn controllables(&self) -> impl Iterator<Item = (ControllableId, &Controllable<U>)> {
        self.controllables
            .iter()
            .enumerate()
            .map(|(index, controllable)| (ControllableId(index), controllable))
    }

    /// The controllable that currently drives the sink, if this controller
    /// has wired one.
    pub fn active(&self) -> Option<ControllableId> {
        self.active
    }

    pub fn sink(&self) -> &Input<U> {
        &self.sink
    }

    /// Drive the sink from `source` through a controllable.
    ///
    /// With `Some(id)` that controllable is used; it fails with
    /// [`Error::UnknownControllable`] or [`Error::ReferenceTypeMismatch`].
    /// With `None` the registry is searched for the one controllable that
    /// accepts `R` and is not itself the producer of `source`; zero or
    /// several matches fail with [`Error::NoMatchingControllable`].
    ///
    /// On success `source` feeds the controllable's reference input and the
    /// controllable's control output feeds the sink.
    pub fn track_reference_signal<R: Send + 'static>(
        &mut self,
        source: &Output<R>,
        controllable: Option<ControllableId>,
    ) -> Result<ControllableId> {
        let id = match controllable {
            Some(id) => self.check::<R>(id)?,
            None => self.find(source)?,
        };

        let chosen = &self.controllables[id.0];
        let reference = chosen
            .reference_input::<R>()
            .ok_or(Error::ReferenceTypeMismatch {
                expected: chosen.reference_type_name,
                found: type_name::<R>(),
            })?;

        with_manager_lock(&self.sink.core.owner, || {
            force_connect(source, reference);
            force_connect(&chosen.control_output, &self.sink);
        });

        debug!(controllable = %chosen.name, "tracking reference signal");
        self.active = Some(id);
        Ok(id)
    }

    fn check<R: 'static>(&self, id: ControllableId) -> Result<ControllableId> {
        let chosen = self
            .controllables
            .get(id.0)
            .ok_or(Error::UnknownControllable(id))?;
        if !chosen.accepts::<R>() {
            return Err(Error::ReferenceTypeMismatch {
                expected: chosen.reference_type_name,
                found: type_name::<R>(),
            });
        }
        Ok(id)
    }

    fn find<R: 'static>(&self, source: &Output<R>) -> Result<ControllableId> {
        let mut matches = self
            .controllables()
            .filter(|(_, candidate)| candidate.accepts::<R>() && !candidate.produces(source))
            .map(|(id, _)| id);

        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id),
            (None, _) => Err(Error::NoMatchingControllable { candidates: 0 }),
            (Some(_), Some(_)) => Err(Error::NoMatchingControllable {
                candidates: 2 + matches.count(),
            }),
        }
    }
}

impl<U: Send + 'static> fmt::Debug for SupervisoryController<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisoryController")
            .field("controllables", &self.controllables)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{Node, Ports, System};
    use crate::systems::{Callback, Constant, Gain};

    struct Actuator {
        torque: Input<f64>,
        applied: Vec<f64>,
    }

    impl System for Actuator {
        fn operate(&mut self) -> Result<()> {
            let torque = self.torque.get_value()?;
            self.applied.push(torque);
            Ok(())
        }
    }

    fn actuator() -> Node<Actuator> {
        Node::new("actuator", |ports: &Ports| Actuator {
            torque: ports.input(),
            applied: Vec::new(),
        })
    }

    fn gain_controllable(name: &str, gain: &Node<Gain<f64>>) -> Controllable<f64> {
        let state = gain.lock();
        Controllable::new(name, state.input.clone(), state.output.clone())
    }

    #[test]
    fn switching_rebinds_the_sink() {
        let arm = actuator();
        let x = Node::new("x", |ports| Gain::new(ports, 2.0));
        let y = Node::new("y", |ports| Gain::new(ports, 3.0));
        let reference = Node::new("reference", |ports| Constant::new(ports, 10.0));
        let source = reference.lock().output.clone();

        let sink = arm.lock().torque.clone();
        let mut supervisor = SupervisoryController::new(&sink);
        let x_id = supervisor.register_controllable(gain_controllable("x", &x));
        let y_id = supervisor.register_controllable(gain_controllable("y", &y));

        supervisor.track_reference_signal(&source, Some(x_id)).unwrap();
        assert_eq!(supervisor.active(), Some(x_id));
        source.set_value(10.0).unwrap();
        assert_eq!(arm.lock().applied, vec![20.0]);

        supervisor.track_reference_signal(&source, Some(y_id)).unwrap();
        assert_eq!(supervisor.active(), Some(y_id));
        assert_eq!(x.lock().output.num_inputs(), 0);
        assert_eq!(y.lock().output.num_inputs(), 1);

        source.set_value(10.0).unwrap();
        assert_eq!(arm.lock().applied, vec![20.0, 30.0]);
    }

    #[test]
    fn search_requires_exactly_one_match() {
        let arm = actuator();
        let x = Node::new("x", |ports| Gain::new(ports, 1.0));
        let y = Node::new("y", |ports| Gain::new(ports, 1.0));
        let source = Node::new("reference", |ports| Constant::new(ports, 0.0));
        let source = source.lock().output.clone();

        let mut supervisor = SupervisoryController::new(&arm.lock().torque.clone());
        assert!(matches!(
            supervisor.track_reference_signal(&source, None),
            Err(Error::NoMatchingControllable { candidates: 0 })
        ));

        supervisor.register_controllable(gain_controllable("x", &x));
        supervisor.register_controllable(gain_controllable("y", &y));
        assert!(matches!(
            supervisor.track_reference_signal(&source, None),
            Err(Error::NoMatchingControllable { candidates: 2 })
        ));
        assert_eq!(supervisor.active(), None);
        assert!(!arm.lock().torque.is_connected());
    }

    #[test]
    fn search_matches_on_reference_type() {
        let arm = actuator();
        let joint = Node::new("joint", |ports| Gain::new(ports, 1.0));
        let cartesian = Node::new("cartesian", |ports| {
            Callback::new(ports, |pose: &[f64; 3]| pose.iter().sum::<f64>())
        });
        let pose = Node::new("pose", |ports| Constant::new(ports, [1.0, 2.0, 3.0]));

        let mut supervisor = SupervisoryController::new(&arm.lock().torque.clone());
        supervisor.register_controllable(gain_controllable("joint", &joint));
        let cartesian_id = {
            let state = cartesian.lock();
            supervisor.register_controllable(Controllable::new(
                "cartesian",
                state.input.clone(),
                state.output.clone(),
            ))
        };

        let pose_output = pose.lock().output.clone();
        let chosen = supervisor.track_reference_signal(&pose_output, None).unwrap();
        assert_eq!(chosen, cartesian_id);

        pose.node_ref().trigger().unwrap();
        assert_eq!(arm.lock().applied, vec![6.0]);
    }

    #[test]
    fn search_skips_the_source_controllable() {
        let arm = actuator();
        let x = Node::new("x", |ports| Gain::new(ports, 1.0));
        let y = Node::new("y", |ports| Gain::new(ports, 1.0));

        let mut supervisor = SupervisoryController::new(&arm.lock().torque.clone());
        supervisor.register_controllable(gain_controllable("x", &x));
        let y_id = supervisor.register_controllable(gain_controllable("y", &y));

        // x's own output can only be tracked through y.
        let x_output = x.lock().output.clone();
        assert_eq!(
            supervisor.track_reference_signal(&x_output, None).unwrap(),
            y_id
        );
    }

    #[test]
    fn explicit_ids_are_checked() {
        let arm = actuator();
        let x = Node::new("x", |ports| Gain::new(ports, 1.0));
        let source = Node::new("flag", |ports| Constant::new(ports, 1_i32));
        let source = source.lock().output.clone();

        let mut supervisor = SupervisoryController::new(&arm.lock().torque.clone());
        let x_id = supervisor.register_controllable(gain_controllable("x", &x));

        assert!(matches!(
            supervisor.track_reference_signal(&source, Some(ControllableId(7))),
            Err(Error::UnknownControllable(ControllableId(7)))
        ));
        assert!(matches!(
            supervisor.track_reference_signal(&source, Some(x_id)),
            Err(Error::ReferenceTypeMismatch { .. })
        ));
    }
}
