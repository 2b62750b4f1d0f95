//! Activation functions shared by layer, activation and recurrent nodes.

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, GraphForgeError};
use crate::graph::ArchiveObject;
use crate::math::Real;

use super::kernels::softmax;

pub const DEFAULT_LEAKY_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationType {
    None,
    Relu,
    LeakyRelu { alpha: f64 },
    Sigmoid,
    Tanh,
    HardSigmoid,
    Softmax,
}

impl ActivationType {
    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::None => "none",
            ActivationType::Relu => "ReLU",
            ActivationType::LeakyRelu { .. } => "leakyReLU",
            ActivationType::Sigmoid => "sigmoid",
            ActivationType::Tanh => "tanh",
            ActivationType::HardSigmoid => "hardSigmoid",
            ActivationType::Softmax => "softmax",
        }
    }

    /// Element-wise activations; softmax couples all elements of a vector
    pub fn is_elementwise(&self) -> bool {
        !matches!(self, ActivationType::Softmax)
    }

    /// Apply to one element. Softmax is the identity here; use
    /// [`apply_slice`](Self::apply_slice) for vectors.
    pub fn apply<T: Real>(&self, x: T) -> T {
        match self {
            ActivationType::None | ActivationType::Softmax => x,
            ActivationType::Relu => x.max(T::zero()),
            ActivationType::LeakyRelu { alpha } => {
                if x > T::zero() {
                    x
                } else {
                    T::from_f64(*alpha) * x
                }
            }
            ActivationType::Sigmoid => T::one() / (T::one() + (-x).exp()),
            ActivationType::Tanh => x.tanh(),
            ActivationType::HardSigmoid => (T::from_f64(0.2) * x + T::from_f64(0.5))
                .max(T::zero())
                .min(T::one()),
        }
    }

    pub fn apply_slice<T: Real>(&self, values: &[T]) -> Vec<T> {
        match self {
            ActivationType::Softmax => softmax(values),
            other => values.iter().map(|&x| other.apply(x)).collect(),
        }
    }

    /// Write under `field`, with leaky alpha under `<field>Alpha`
    pub fn write_to_archive(&self, archive: &mut ArchiveObject, field: &str) {
        archive.set_string(field, self.name());
        if let ActivationType::LeakyRelu { alpha } = self {
            archive.set_float(&format!("{}Alpha", field), *alpha);
        }
    }

    pub fn read_from_archive(archive: &ArchiveObject, field: &str) -> ForgeResult<Self> {
        match archive.get_string(field)?.parse()? {
            ActivationType::LeakyRelu { .. } => Ok(ActivationType::LeakyRelu {
                alpha: archive.get_float_or(&format!("{}Alpha", field), DEFAULT_LEAKY_ALPHA)?,
            }),
            other => Ok(other),
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationType {
    type Err = GraphForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(ActivationType::None),
            "ReLU" | "relu" => Ok(ActivationType::Relu),
            "leakyReLU" | "leakyRelu" => Ok(ActivationType::LeakyRelu {
                alpha: DEFAULT_LEAKY_ALPHA,
            }),
            "sigmoid" => Ok(ActivationType::Sigmoid),
            "tanh" => Ok(ActivationType::Tanh),
            "hardSigmoid" => Ok(ActivationType::HardSigmoid),
            "softmax" => Ok(ActivationType::Softmax),
            other => Err(GraphForgeError::arg_parse(
                "activation",
                other,
                "not a known activation",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementwise_values() {
        assert_eq!(ActivationType::Relu.apply(-2.0f32), 0.0);
        assert_eq!(ActivationType::LeakyRelu { alpha: 0.1 }.apply(-2.0f64), -0.2);
        assert_eq!(ActivationType::Sigmoid.apply(0.0f64), 0.5);
        assert_eq!(ActivationType::HardSigmoid.apply(10.0f32), 1.0);
        assert_eq!(ActivationType::HardSigmoid.apply(0.0f32), 0.5);
    }

    #[test]
    fn test_softmax_slice_sums_to_one() {
        let out = ActivationType::Softmax.apply_slice(&[1.0f64, 2.0, 3.0]);
        let total: f64 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_archive_keeps_alpha() {
        let mut archive = ArchiveObject::new();
        ActivationType::LeakyRelu { alpha: 0.3 }.write_to_archive(&mut archive, "activation");
        assert_eq!(
            ActivationType::read_from_archive(&archive, "activation").unwrap(),
            ActivationType::LeakyRelu { alpha: 0.3 }
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("ReLU".parse::<ActivationType>().unwrap(), ActivationType::Relu);
        assert!("swish".parse::<ActivationType>().is_err());
    }
}
