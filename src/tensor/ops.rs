use super::*;
use std::ops::{Add, BitXor, Mul, Sub};

macro_rules! elementwise_op {
    ($tr:ident, $method:ident, $op:tt) => {
        impl<'a, T: TensorOps<f32>> $tr<&T> for &TensorView<'a, f32> {
            type Output = Result<Tensor<f32>, TensorError>;
            fn $method(self, other: &T) -> Self::Output {
                combine(self, other, |a, b| a $op b)
            }
        }
        impl<T: TensorOps<f32>> $tr<&T> for &Tensor<f32> {
            type Output = Result<Tensor<f32>, TensorError>;
            fn $method(self, other: &T) -> Self::Output {
                combine(self, other, |a, b| a $op b)
            }
        }
    };
}

elementwise_op!(Add, add, +);
elementwise_op!(Sub, sub, -);
elementwise_op!(Mul, mul, *);

/// Batched matrix product over the last two axes; leading axes broadcast.
fn batched_matmul<T1: TensorOps<f32>, T2: TensorOps<f32>>(
    a: &T1,
    b: &T2,
) -> Result<Tensor<f32>, TensorError> {
    combine_map(a, b, 2, |a, b| matmul_2d(a, b))
}

impl<'a, T: TensorOps<f32>> BitXor<&T> for &TensorView<'a, f32> {
    type Output = Result<Tensor<f32>, TensorError>;
    fn bitxor(self, other: &T) -> Self::Output {
        batched_matmul(self, other)
    }
}

impl<T: TensorOps<f32>> BitXor<&T> for &Tensor<f32> {
    type Output = Result<Tensor<f32>, TensorError>;
    fn bitxor(self, other: &T) -> Self::Output {
        batched_matmul(self, other)
    }
}
