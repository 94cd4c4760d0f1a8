use crate::error::Result;
use crate::port::{Input, Output};
use crate::system::{Ports, System};

/// Applies a closure to its input and publishes the result.
pub struct Callback<I, O> {
    pub input: Input<I>,
    pub output: Output<O>,
    f: Box<dyn FnMut(&I) -> O + Send>,
}

impl<I: Send + 'static, O: Send + 'static> Callback<I, O> {
    pub fn new(ports: &Ports, f: impl FnMut(&I) -> O + Send + 'static) -> Self {
        Self {
            input: ports.input(),
            output: ports.output(),
            f: Box::new(f),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> System for Callback<I, O> {
    fn operate(&mut self) -> Result<()> {
        let f = &mut self.f;
        let result = self.input.with_value(|value| f(value))?;
        self.output.set_value(result)
    }
}
