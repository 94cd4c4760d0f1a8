use super::Arithmetic;
use crate::error::Result;
use crate::port::{Input, Output};
use crate::system::{Ports, System};

/// `output = gain * input`, elementwise.
pub struct Gain<T> {
    pub input: Input<T>,
    pub output: Output<T>,
    gain: T,
}

impl<T: Arithmetic> Gain<T> {
    pub fn new(ports: &Ports, gain: T) -> Self {
        Self {
            input: ports.input(),
            output: ports.output(),
            gain,
        }
    }

    pub fn gain(&self) -> &T {
        &self.gain
    }

    pub fn set_gain(&mut self, gain: T) {
        self.gain = gain;
    }
}

impl<T: Arithmetic> System for Gain<T> {
    fn operate(&mut self) -> Result<()> {
        let scaled = self.input.with_value(|value| self.gain.mul(value))?;
        self.output.set_value(scaled)
    }
}
