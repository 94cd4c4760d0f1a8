use super::Arithmetic;
use crate::error::Result;
use crate::port::{Input, Output};
use crate::system::{Ports, System};

/// `output = reference - feedback`: the error signal of a control loop.
pub struct Summer<T> {
    pub reference: Input<T>,
    pub feedback: Input<T>,
    pub output: Output<T>,
}

impl<T: Arithmetic> Summer<T> {
    pub fn new(ports: &Ports) -> Self {
        Self {
            reference: ports.input(),
            feedback: ports.input(),
            output: ports.output(),
        }
    }
}

impl<T: Arithmetic> System for Summer<T> {
    fn operate(&mut self) -> Result<()> {
        let reference = self.reference.get_value()?;
        let error = self.feedback.with_value(|feedback| reference.sub(feedback))?;
        self.output.set_value(error)
    }
}
