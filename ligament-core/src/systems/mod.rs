//! Leaf Systems
//!
//! Small building blocks for wiring up and testing graphs: a constant
//! source, an elementwise gain, a reference/feedback summer, and a node that
//! wraps a closure.
//!
//! Numeric helpers work on any [`Arithmetic`] type. Scalars and fixed-size
//! arrays (joint vectors) are supported out of the box.

mod callback;
mod constant;
mod gain;
mod summer;

pub use callback::Callback;
pub use constant::Constant;
pub use gain::Gain;
pub use summer::Summer;

/// Elementwise arithmetic used by the numeric helpers.
pub trait Arithmetic: Clone + Send + 'static {
    fn sub(&self, rhs: &Self) -> Self;
    fn mul(&self, rhs: &Self) -> Self;
}

macro_rules! scalar_arithmetic {
    ($($ty:ty),*) => {
        $(
            impl Arithmetic for $ty {
                fn sub(&self, rhs: &Self) -> Self {
                    self - rhs
                }

                fn mul(&self, rhs: &Self) -> Self {
                    self * rhs
                }
            }
        )*
    };
}

scalar_arithmetic!(f32, f64, i32, i64);

macro_rules! array_arithmetic {
    ($($ty:ty),*) => {
        $(
            impl<const N: usize> Arithmetic for [$ty; N] {
                fn sub(&self, rhs: &Self) -> Self {
                    std::array::from_fn(|i| self[i] - rhs[i])
                }

                fn mul(&self, rhs: &Self) -> Self {
                    std::array::from_fn(|i| self[i] * rhs[i])
                }
            }
        )*
    };
}

array_arithmetic!(f32, f64);
