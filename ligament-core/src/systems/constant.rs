use crate::error::Result;
use crate::port::Output;
use crate::system::{Ports, System};

/// Publishes a fixed value every time it is triggered.
pub struct Constant<T> {
    pub output: Output<T>,
    value: T,
}

impl<T: Clone + Send + 'static> Constant<T> {
    pub fn new(ports: &Ports, value: T) -> Self {
        Self {
            output: ports.output(),
            value,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Replace the value. Published from the next trigger on.
    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: Clone + Send + 'static> System for Constant<T> {
    fn operate(&mut self) -> Result<()> {
        self.output.set_value(self.value.clone())
    }
}
