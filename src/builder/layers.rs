//! Parameters of the CoreML layers which converters can emit.
//!
//! These mirror the messages in CoreML's `NeuralNetwork.proto`, restricted to
//! the fields that the converters set.

use rten_tensor::prelude::*;
use rten_tensor::Tensor;
use smallvec::SmallVec;

/// List of axes or dimension sizes.
///
/// Axes may be negative, counting back from the last axis. Shape entries
/// may be `0` (copy the input size) or `-1` (infer from the element count)
/// where the layer allows it.
pub type Dims = SmallVec<[i64; 5]>;

/// Non-linearity applied by an activation layer or inside an LSTM.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    SigmoidHard,
    ScaledTanh,
    Tanh,
}

impl Activation {
    /// Map an ONNX activation function name to a CoreML activation.
    ///
    /// ONNX names are case-sensitive but exporters are not always consistent,
    /// so matching ignores case.
    pub fn from_onnx_name(name: &str) -> Option<Activation> {
        let activation = match name.to_ascii_lowercase().as_str() {
            "sigmoid" => Activation::Sigmoid,
            "tanh" => Activation::Tanh,
            "relu" => Activation::Relu,
            "hardsigmoid" => Activation::SigmoidHard,
            "scaledtanh" => Activation::ScaledTanh,
            "affine" | "linear" => Activation::Linear,
            _ => return None,
        };
        Some(activation)
    }

    /// Name of the activation in CoreML's `ActivationParams` message.
    pub fn coreml_name(&self) -> &'static str {
        match self {
            Activation::Linear => "LINEAR",
            Activation::Relu => "RELU",
            Activation::Sigmoid => "SIGMOID",
            Activation::SigmoidHard => "SIGMOID_HARD",
            Activation::ScaledTanh => "SCALED_TANH",
            Activation::Tanh => "TANH",
        }
    }
}

/// Weights for one direction of a CoreML LSTM layer.
///
/// Each array holds one matrix or vector per gate in CoreML gate order:
/// input, forget, output, cell.
#[derive(Clone, Debug, PartialEq)]
pub struct LstmWeights {
    /// Input-to-hidden matrices, each `[hidden_size, input_size]`.
    pub input: [Vec<f32>; 4],
    /// Hidden-to-hidden matrices, each `[hidden_size, hidden_size]`.
    pub recurrent: [Vec<f32>; 4],
    /// Per-gate biases, each `[hidden_size]`.
    pub bias: Option<[Vec<f32>; 4]>,
}

impl LstmWeights {
    /// Check chunk sizes against the layer dimensions.
    fn validate(&self, hidden_size: usize, input_size: usize) -> Result<(), String> {
        let check = |what: &str, chunks: &[Vec<f32>; 4], expected: usize| {
            match chunks.iter().find(|chunk| chunk.len() != expected) {
                Some(chunk) => Err(format!(
                    "{what} gate weights have {} elements, expected {expected}",
                    chunk.len()
                )),
                None => Ok(()),
            }
        };
        check("input", &self.input, hidden_size * input_size)?;
        check("recurrent", &self.recurrent, hidden_size * hidden_size)?;
        if let Some(bias) = &self.bias {
            check("bias", bias, hidden_size)?;
        }
        Ok(())
    }
}

/// Parameters shared by uni- and bi-directional LSTM layers.
#[derive(Clone, Debug, PartialEq)]
pub struct LstmParams {
    pub hidden_size: usize,
    pub input_size: usize,

    /// Gate activation (ONNX `f`).
    pub inner_activation: Activation,
    /// Cell update activation (ONNX `g`).
    pub cell_state_update_activation: Activation,
    /// Output activation (ONNX `h`).
    pub output_activation: Activation,

    pub cell_clip_threshold: f32,
    pub coupled_input_forget_gate: bool,

    /// Produce the full output sequence rather than just the last step.
    pub output_all: bool,
    pub forget_bias: bool,
}

impl LstmParams {
    fn validate(&self) -> Result<(), String> {
        if self.hidden_size == 0 {
            return Err("hidden size must be non-zero".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniLstmParams {
    pub params: LstmParams,
    pub weights: LstmWeights,
    /// Name of a tensor holding `[3, hidden]` peephole weights, in ONNX gate
    /// order (input, output, forget).
    pub peephole: Option<String>,
    pub reverse_input: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BiLstmParams {
    pub params: LstmParams,
    pub forward: LstmWeights,
    pub backward: LstmWeights,
    pub peephole: Option<String>,
    pub peephole_back: Option<String>,
}

/// Parameters of a `SliceStaticLayer`. All arrays have one entry per input
/// axis.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceParams {
    pub begin_ids: Vec<i64>,
    pub end_ids: Vec<i64>,
    pub strides: Vec<i64>,
    /// If true, the begin index for the axis is ignored and slicing starts
    /// at the first element.
    pub begin_masks: Vec<bool>,
    /// If true, the end index for the axis is ignored and slicing continues
    /// to the last element.
    pub end_masks: Vec<bool>,
}

impl SliceParams {
    fn validate(&self) -> Result<(), String> {
        let rank = self.begin_ids.len();
        if [
            self.end_ids.len(),
            self.strides.len(),
            self.begin_masks.len(),
            self.end_masks.len(),
        ]
        .iter()
        .any(|len| *len != rank)
        {
            return Err("slice parameter arrays have different lengths".to_string());
        }
        if self.strides.contains(&0) {
            return Err("slice strides must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Constant right-hand operand of a batched matrix multiplication.
#[derive(Clone, Debug, PartialEq)]
pub struct MatMulWeights {
    pub rows: usize,
    pub columns: usize,
    /// Row-major `[rows, columns]` matrix.
    pub values: Vec<f32>,
}

/// Type-specific parameters of a [`Layer`].
#[derive(Clone, Debug)]
pub enum LayerParams {
    LoadConstantNd {
        shape: Vec<usize>,
        value: Tensor<f32>,
    },
    ConcatNd {
        axis: i64,
    },
    FillStatic {
        target_shape: Dims,
        value: f32,
    },
    FillDynamic {
        value: f32,
    },
    Gather {
        axis: i64,
    },
    ExpandDims {
        axes: Dims,
    },
    ReshapeStatic {
        target_shape: Dims,
    },
    RankPreservingReshape {
        target_shape: Dims,
    },
    ReshapeDynamic,
    Squeeze {
        axes: Dims,
        squeeze_all: bool,
    },
    Transpose {
        axes: Dims,
    },
    SplitNd {
        axis: i64,
        num_splits: usize,
        split_sizes: Dims,
    },
    GetShape,
    SliceStatic(SliceParams),
    BatchedMatMul {
        weights: Option<MatMulWeights>,
    },
    UniLstm(Box<UniLstmParams>),
    BiLstm(Box<BiLstmParams>),
    Activation(Activation),
}

impl LayerParams {
    /// Name of the layer type in CoreML's `NeuralNetworkLayer.layer` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadConstantNd { .. } => "loadConstantND",
            Self::ConcatNd { .. } => "concatND",
            Self::FillStatic { .. } => "fillStatic",
            Self::FillDynamic { .. } => "fillDynamic",
            Self::Gather { .. } => "gather",
            Self::ExpandDims { .. } => "expandDims",
            Self::ReshapeStatic { .. } => "reshapeStatic",
            Self::RankPreservingReshape { .. } => "rankPreservingReshape",
            Self::ReshapeDynamic => "reshapeDynamic",
            Self::Squeeze { .. } => "squeeze",
            Self::Transpose { .. } => "transpose",
            Self::SplitNd { .. } => "splitND",
            Self::GetShape => "getShape",
            Self::SliceStatic(_) => "sliceStatic",
            Self::BatchedMatMul { .. } => "batchedMatmul",
            Self::UniLstm(_) => "uniDirectionalLSTM",
            Self::BiLstm(_) => "biDirectionalLSTM",
            Self::Activation(_) => "activation",
        }
    }

    /// Check parameters for internal consistency.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::LoadConstantNd { shape, value } => {
                let expected: usize = shape.iter().product();
                if value.len() != expected {
                    return Err(format!(
                        "constant has {} elements but shape {:?} needs {}",
                        value.len(),
                        shape,
                        expected
                    ));
                }
                Ok(())
            }
            Self::SliceStatic(params) => params.validate(),
            Self::BatchedMatMul {
                weights: Some(weights),
            } => {
                if weights.values.len() != weights.rows * weights.columns {
                    return Err(format!(
                        "weight matrix has {} elements, expected {}x{}",
                        weights.values.len(),
                        weights.rows,
                        weights.columns
                    ));
                }
                Ok(())
            }
            Self::UniLstm(lstm) => {
                lstm.params.validate()?;
                lstm.weights
                    .validate(lstm.params.hidden_size, lstm.params.input_size)
            }
            Self::BiLstm(lstm) => {
                lstm.params.validate()?;
                let (hidden, input) = (lstm.params.hidden_size, lstm.params.input_size);
                lstm.forward.validate(hidden, input)?;
                lstm.backward.validate(hidden, input)
            }
            _ => Ok(()),
        }
    }
}

/// A layer in a CoreML neural network.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    params: LayerParams,
}

impl Layer {
    pub(crate) fn new(
        name: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        params: LayerParams,
    ) -> Layer {
        Layer {
            name,
            inputs,
            outputs,
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    pub fn kind(&self) -> &'static str {
        self.params.kind()
    }
}
