use rten_tensor::prelude::*;
use rten_tensor::Tensor;

/// Value of a tensor that is known at conversion time.
///
/// ONNX initializers and `Constant` node values are usually either `float`
/// (weights) or `int64` (shapes, indices, axes). Other element types are
/// converted to one of these by the model loader.
#[derive(Clone, Debug)]
pub enum ConstantValue {
    Float(Tensor<f32>),
    Int(Tensor<i64>),
}

impl ConstantValue {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(t) => t.shape(),
            Self::Int(t) => t.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape used when the value is loaded into a CoreML network.
    ///
    /// CoreML has no rank-0 tensors, so scalars become `[1]`.
    pub fn load_shape(&self) -> Vec<usize> {
        if self.ndim() == 0 {
            vec![1]
        } else {
            self.shape().to_vec()
        }
    }

    /// Convert the value to the float representation stored in CoreML weight
    /// parameters and constant layers.
    pub fn to_float(&self) -> Tensor<f32> {
        match self {
            Self::Float(t) => t.clone(),
            Self::Int(t) => t.map(|x| *x as f32),
        }
    }

    /// Return the elements as integers, in row-major order.
    ///
    /// Float values are truncated towards zero.
    pub fn to_ints(&self) -> Vec<i64> {
        match self {
            Self::Float(t) => t.iter().map(|x| *x as i64).collect(),
            Self::Int(t) => t.to_vec(),
        }
    }

    /// Return the elements as floats, in row-major order.
    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            Self::Float(t) => t.to_vec(),
            Self::Int(t) => t.iter().map(|x| *x as f32).collect(),
        }
    }

    /// Return the first element as a float, if there is one.
    pub fn first_float(&self) -> Option<f32> {
        match self {
            Self::Float(t) => t.iter().next().copied(),
            Self::Int(t) => t.iter().next().map(|x| *x as f32),
        }
    }
}

impl From<Tensor<f32>> for ConstantValue {
    fn from(val: Tensor<f32>) -> Self {
        Self::Float(val)
    }
}

impl From<Tensor<i64>> for ConstantValue {
    fn from(val: Tensor<i64>) -> Self {
        Self::Int(val)
    }
}

impl From<f32> for ConstantValue {
    fn from(val: f32) -> Self {
        Self::Float(Tensor::from_scalar(val))
    }
}

impl From<i64> for ConstantValue {
    fn from(val: i64) -> Self {
        Self::Int(Tensor::from_scalar(val))
    }
}

impl From<Vec<i64>> for ConstantValue {
    fn from(val: Vec<i64>) -> Self {
        Self::Int(Tensor::from(val))
    }
}

impl From<Vec<f32>> for ConstantValue {
    fn from(val: Vec<f32>) -> Self {
        Self::Float(Tensor::from(val))
    }
}
