use super::{float_input, Function};
use crate::tensor::*;

const SQRT_2_OVER_PI: f32 = 0.7978845608;
const GELU_CONST: f32 = 0.044715;

/// Tanh approximation of GELU.
fn gelu(x: f32) -> f32 {
    0.5 * x * ((SQRT_2_OVER_PI * (x + GELU_CONST * x.powi(3))).tanh() + 1.)
}

/// Derivative of [`gelu`], with `sech^2` written as `1 - tanh^2`.
fn gelu_prime(x: f32) -> f32 {
    let t = (SQRT_2_OVER_PI * (x + GELU_CONST * x.powi(3))).tanh();
    let dv = SQRT_2_OVER_PI * (1. + 3. * GELU_CONST * x * x);
    0.5 * (1. + t) + 0.5 * x * (1. - t * t) * dv
}

#[derive(Debug, Clone)]
pub struct Gelu;
impl Gelu {
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {})
    }
}
impl Function for Gelu {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        Ok(float_input(inps, 0)?.map_values(gelu))
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let der = float_input(inps, 0)?.map_values(gelu_prime);
        Ok(vec![(&der * out_grad)?])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;

    #[test]
    fn test_gelu_values() {
        assert_eq!(gelu(0.), 0.);
        assert!((gelu(1.) - 0.841192).abs() < 1e-5);
        assert!((gelu(-1.) + 0.158808).abs() < 1e-5);
        assert!((gelu(10.) - 10.).abs() < 1e-4);
    }

    #[test]
    fn test_gelu_prime() {
        assert_eq!(gelu_prime(0.), 0.5);
        for x in [-3., -1., -0.2, 0.7, 2.5] {
            let numeric = (gelu(x + 1e-3) - gelu(x - 1e-3)) / 2e-3;
            assert!((gelu_prime(x) - numeric).abs() < 1e-3);
        }
    }

    #[test]
    fn test_gelu_grad() {
        let mut f = Gelu;
        check_grad(&mut f, &[float(&[3, 5], 1)], 1e-2, 1e-2);
    }
}
