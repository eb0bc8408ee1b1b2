use core::ops::{Add, Div, Mul, Sub};

macro_rules! constrained_f64 {
    ( $name:ident, $closure:tt, $msg:expr) => {
        #[derive(Debug, Copy, Clone)]
        pub struct $name(f64);

        impl $name {
            pub fn new(x: f64) -> Self {
                assert!(($closure)(x), $msg);
                Self(x)
            }

            pub fn unwrap(self) -> f64 {
                self.0
            }

            pub fn ln(self) -> f64 {
                self.0.ln()
            }
        }

        impl Add<f64> for $name {
            type Output = f64;

            fn add(self, other: f64) -> f64 {
                self.0 + other
            }
        }

        impl Add<$name> for f64 {
            type Output = f64;

            fn add(self, other: $name) -> f64 {
                self + other.0
            }
        }

        impl Sub<f64> for $name {
            type Output = f64;

            fn sub(self, other: f64) -> f64 {
                self.0 - other
            }
        }

        impl Sub<$name> for f64 {
            type Output = f64;

            fn sub(self, other: $name) -> f64 {
                self - other.0
            }
        }

        impl Mul<f64> for $name {
            type Output = f64;

            fn mul(self, other: f64) -> f64 {
                self.0 * other
            }
        }

        impl Mul<$name> for f64 {
            type Output = f64;

            fn mul(self, other: $name) -> f64 {
                self * other.0
            }
        }

        impl Div<f64> for $name {
            type Output = f64;

            fn div(self, other: f64) -> f64 {
                self.0 / other
            }
        }

        impl Div<$name> for f64 {
            type Output = f64;

            fn div(self, other: $name) -> f64 {
                self / other.0
            }
        }
    };
}

constrained_f64!(
    Discount,
    (|x| (0.0..1.0).contains(&x)),
    "Discount must be in [0,1)."
);

pub use crate::error::Error;
pub use crate::stirling::LogStirlingGenerator;
pub use crate::store::{ChunkedStore, FixedStore, StirlingStore};
pub use crate::tree::{ProbabilityTree, TyingStrategy};
