//! Construction of CoreML neural network layers.
//!
//! [`NetworkBuilder`] accumulates the layers emitted by node converters. It
//! maintains a symbol table mapping each tensor name to whatever produces it,
//! either a declared network input or a previously added layer, and rejects
//! layers which would give a tensor a second producer.

use std::error::Error;
use std::fmt::{Display, Formatter};

use rten_tensor::Tensor;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

mod layers;

pub use layers::{
    Activation, BiLstmParams, Dims, Layer, LayerParams, LstmParams, LstmWeights, MatMulWeights,
    SliceParams, UniLstmParams,
};

/// Errors that occur when adding a layer to a [`NetworkBuilder`].
#[derive(Clone, Debug, PartialEq)]
pub enum BuildError {
    /// A tensor already has a producer.
    DuplicateOutput { name: String, layer: String },

    /// Another layer already has this name.
    DuplicateLayer { name: String },

    /// A layer reads a tensor that has no producer.
    UnknownInput { name: String, layer: String },

    /// A layer has the wrong number of inputs or outputs.
    InvalidArity {
        layer: String,
        kind: &'static str,
        error: String,
    },

    /// Layer parameters are inconsistent.
    InvalidParams { layer: String, error: String },
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOutput { name, layer } => write!(
                f,
                "layer \"{}\" writes tensor \"{}\" which is already produced",
                layer, name
            ),
            Self::DuplicateLayer { name } => write!(f, "duplicate layer name \"{}\"", name),
            Self::UnknownInput { name, layer } => write!(
                f,
                "layer \"{}\" reads tensor \"{}\" which has no producer",
                layer, name
            ),
            Self::InvalidArity { layer, kind, error } => {
                write!(f, "{} layer \"{}\": {}", kind, layer, error)
            }
            Self::InvalidParams { layer, error } => {
                write!(f, "invalid parameters for layer \"{}\": {}", layer, error)
            }
        }
    }
}

impl Error for BuildError {}

/// What produces a tensor in the network.
#[derive(Copy, Clone, Debug)]
pub enum Producer<'a> {
    /// The tensor is a network input.
    Input,
    /// The tensor is an output of a layer.
    Layer(&'a Layer),
}

/// Accumulates the layers of a CoreML neural network.
pub struct NetworkBuilder {
    layers: Vec<Layer>,

    /// Map of tensor name to index of producing layer in `layers`.
    producers: FxHashMap<String, usize>,

    inputs: FxHashSet<String>,
    layer_names: FxHashSet<String>,

    /// Whether to reject layers that read tensors with no producer.
    validate_inputs: bool,
}

/// Convert a list of tensor names to owned strings.
fn to_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| n.as_ref().to_string()).collect()
}

impl NetworkBuilder {
    pub fn new() -> NetworkBuilder {
        NetworkBuilder {
            layers: Vec::new(),
            producers: FxHashMap::default(),
            inputs: FxHashSet::default(),
            layer_names: FxHashSet::default(),
            validate_inputs: true,
        }
    }

    /// Enable or disable checking that each layer input has a producer.
    ///
    /// Disable this when converting a subgraph whose inputs are not declared
    /// with [`add_input`](NetworkBuilder::add_input).
    pub fn with_input_validation(mut self, validate: bool) -> Self {
        self.validate_inputs = validate;
        self
    }

    /// Declare a network input.
    pub fn add_input(&mut self, name: &str) -> Result<(), BuildError> {
        if self.producer(name).is_some() {
            return Err(BuildError::DuplicateOutput {
                name: name.to_string(),
                layer: "<input>".to_string(),
            });
        }
        self.inputs.insert(name.to_string());
        Ok(())
    }

    /// Return the layers added so far, in the order they were added.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<Layer> {
        self.layers
    }

    /// Return the number of layers added.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Find a layer by name.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Look up the producer of a tensor.
    pub fn producer(&self, name: &str) -> Option<Producer<'_>> {
        if self.inputs.contains(name) {
            return Some(Producer::Input);
        }
        self.producers
            .get(name)
            .map(|&idx| Producer::Layer(&self.layers[idx]))
    }

    /// Return true if a tensor named `name` has a producer.
    pub fn has_tensor(&self, name: &str) -> bool {
        self.producer(name).is_some()
    }

    fn check_inputs<S: AsRef<str>>(&self, layer: &str, names: &[S]) -> Result<(), BuildError> {
        if !self.validate_inputs {
            return Ok(());
        }
        if let Some(name) = names.iter().find(|n| !self.has_tensor(n.as_ref())) {
            return Err(BuildError::UnknownInput {
                name: name.as_ref().to_string(),
                layer: layer.to_string(),
            });
        }
        Ok(())
    }

    /// Validate and append a layer, registering its outputs.
    ///
    /// Nothing is added if validation fails.
    fn add_layer(
        &mut self,
        name: &str,
        inputs: Vec<String>,
        outputs: Vec<String>,
        params: LayerParams,
    ) -> Result<(), BuildError> {
        if self.layer_names.contains(name) {
            return Err(BuildError::DuplicateLayer {
                name: name.to_string(),
            });
        }
        self.check_inputs(name, &inputs)?;

        {
            let mut seen = SmallVec::<[&str; 5]>::new();
            for output in &outputs {
                if self.has_tensor(output) || seen.contains(&output.as_str()) {
                    return Err(BuildError::DuplicateOutput {
                        name: output.clone(),
                        layer: name.to_string(),
                    });
                }
                seen.push(output);
            }
        }

        params
            .validate()
            .map_err(|error| BuildError::InvalidParams {
                layer: name.to_string(),
                error,
            })?;

        let idx = self.layers.len();
        for output in &outputs {
            self.producers.insert(output.clone(), idx);
        }
        self.layer_names.insert(name.to_string());
        self.layers
            .push(Layer::new(name.to_string(), inputs, outputs, params));
        Ok(())
    }

    fn arity_error(name: &str, kind: &'static str, error: String) -> BuildError {
        BuildError::InvalidArity {
            layer: name.to_string(),
            kind,
            error,
        }
    }

    /// Add a layer which outputs a constant tensor.
    pub fn add_load_constant_nd(
        &mut self,
        name: &str,
        output_name: &str,
        value: Tensor<f32>,
        shape: &[usize],
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            Vec::new(),
            vec![output_name.to_string()],
            LayerParams::LoadConstantNd {
                shape: shape.to_vec(),
                value,
            },
        )
    }

    /// Add a layer which concatenates its inputs along `axis`.
    pub fn add_concat_nd<S: AsRef<str>>(
        &mut self,
        name: &str,
        input_names: &[S],
        output_name: &str,
        axis: i64,
    ) -> Result<(), BuildError> {
        if input_names.is_empty() {
            return Err(Self::arity_error(
                name,
                "concatND",
                "expected at least one input".into(),
            ));
        }
        self.add_layer(
            name,
            to_names(input_names),
            vec![output_name.to_string()],
            LayerParams::ConcatNd { axis },
        )
    }

    /// Add a layer which outputs a tensor of a fixed shape filled with `value`.
    pub fn add_fill_static(
        &mut self,
        name: &str,
        output_name: &str,
        output_shape: &[i64],
        value: f32,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            Vec::new(),
            vec![output_name.to_string()],
            LayerParams::FillStatic {
                target_shape: output_shape.into(),
                value,
            },
        )
    }

    /// Add a layer which outputs a tensor filled with `value`, whose shape is
    /// given by the 1D input tensor.
    pub fn add_fill_dynamic(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        value: f32,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::FillDynamic { value },
        )
    }

    /// Add a layer which gathers slices of the first input using the indices
    /// in the second input.
    pub fn add_gather<S: AsRef<str>>(
        &mut self,
        name: &str,
        input_names: &[S],
        output_name: &str,
        axis: i64,
    ) -> Result<(), BuildError> {
        if input_names.len() != 2 {
            return Err(Self::arity_error(
                name,
                "gather",
                format!("expected 2 inputs, got {}", input_names.len()),
            ));
        }
        self.add_layer(
            name,
            to_names(input_names),
            vec![output_name.to_string()],
            LayerParams::Gather { axis },
        )
    }

    /// Add a layer which inserts size-1 dimensions at `axes`.
    pub fn add_expand_dims(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        axes: &[i64],
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::ExpandDims { axes: axes.into() },
        )
    }

    /// Add a layer which reshapes its input to a fixed shape.
    pub fn add_reshape_static(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        output_shape: &[i64],
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::ReshapeStatic {
                target_shape: output_shape.into(),
            },
        )
    }

    /// Add a reshape whose output has the same rank as its input.
    ///
    /// A `0` in `output_shape` copies the corresponding input dimension and
    /// a single `-1` is inferred from the element count.
    pub fn add_rank_preserving_reshape(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        output_shape: &[i64],
    ) -> Result<(), BuildError> {
        if output_shape.iter().filter(|&&d| d == -1).count() > 1 {
            return Err(BuildError::InvalidParams {
                layer: name.to_string(),
                error: "at most one dimension can be -1".into(),
            });
        }
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::RankPreservingReshape {
                target_shape: output_shape.into(),
            },
        )
    }

    /// Add a reshape whose target shape is the runtime value of the second
    /// input.
    pub fn add_reshape_dynamic<S: AsRef<str>>(
        &mut self,
        name: &str,
        input_names: &[S],
        output_name: &str,
    ) -> Result<(), BuildError> {
        if input_names.len() != 2 {
            return Err(Self::arity_error(
                name,
                "reshapeDynamic",
                format!("expected 2 inputs, got {}", input_names.len()),
            ));
        }
        self.add_layer(
            name,
            to_names(input_names),
            vec![output_name.to_string()],
            LayerParams::ReshapeDynamic,
        )
    }

    /// Add a layer which removes size-1 dimensions.
    ///
    /// If `axes` is `None`, all size-1 dimensions are removed.
    pub fn add_squeeze(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        axes: Option<&[i64]>,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::Squeeze {
                axes: axes.map(Dims::from).unwrap_or_default(),
                squeeze_all: axes.is_none(),
            },
        )
    }

    /// Add a layer which permutes the dimensions of its input.
    pub fn add_transpose(
        &mut self,
        name: &str,
        axes: &[i64],
        input_name: &str,
        output_name: &str,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::Transpose { axes: axes.into() },
        )
    }

    /// Add a layer which splits its input along `axis`.
    ///
    /// If `split_sizes` is `None`, the input is split into equal parts, one
    /// per output.
    pub fn add_split_nd<S: AsRef<str>>(
        &mut self,
        name: &str,
        input_name: &str,
        output_names: &[S],
        axis: i64,
        split_sizes: Option<&[i64]>,
    ) -> Result<(), BuildError> {
        if output_names.is_empty() {
            return Err(Self::arity_error(
                name,
                "splitND",
                "expected at least one output".into(),
            ));
        }
        if let Some(sizes) = split_sizes {
            if sizes.len() != output_names.len() {
                return Err(Self::arity_error(
                    name,
                    "splitND",
                    format!(
                        "{} split sizes given for {} outputs",
                        sizes.len(),
                        output_names.len()
                    ),
                ));
            }
        }
        self.add_layer(
            name,
            vec![input_name.to_string()],
            to_names(output_names),
            LayerParams::SplitNd {
                axis,
                num_splits: output_names.len(),
                split_sizes: split_sizes.map(Dims::from).unwrap_or_default(),
            },
        )
    }

    /// Add a layer which outputs the shape of its input as a 1D tensor.
    pub fn add_get_shape(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::GetShape,
        )
    }

    /// Add a layer which slices its input with fixed indices.
    pub fn add_slice_static(
        &mut self,
        name: &str,
        input_name: &str,
        output_name: &str,
        params: SliceParams,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::SliceStatic(params),
        )
    }

    /// Add a batched matrix multiplication.
    ///
    /// With `weights`, the layer has one input which is multiplied by the
    /// constant matrix. Without, it multiplies its two inputs.
    pub fn add_batched_mat_mul<S: AsRef<str>>(
        &mut self,
        name: &str,
        input_names: &[S],
        output_name: &str,
        weights: Option<MatMulWeights>,
    ) -> Result<(), BuildError> {
        let expected_inputs = if weights.is_some() { 1 } else { 2 };
        if input_names.len() != expected_inputs {
            return Err(Self::arity_error(
                name,
                "batchedMatmul",
                format!(
                    "expected {} inputs, got {}",
                    expected_inputs,
                    input_names.len()
                ),
            ));
        }
        self.add_layer(
            name,
            to_names(input_names),
            vec![output_name.to_string()],
            LayerParams::BatchedMatMul { weights },
        )
    }

    /// Add a unidirectional LSTM.
    ///
    /// Inputs are `[x, h_0, c_0]` and outputs are `[y, h_n, c_n]`. All are
    /// rank 5.
    pub fn add_unilstm(
        &mut self,
        name: &str,
        input_names: [&str; 3],
        output_names: [&str; 3],
        params: UniLstmParams,
    ) -> Result<(), BuildError> {
        if let Some(peephole) = &params.peephole {
            self.check_inputs(name, &[peephole])?;
        }
        self.add_layer(
            name,
            to_names(&input_names),
            to_names(&output_names),
            LayerParams::UniLstm(Box::new(params)),
        )
    }

    /// Add a bidirectional LSTM.
    ///
    /// Inputs are `[x, h_0_fwd, c_0_fwd, h_0_back, c_0_back]` and outputs are
    /// `[y, h_n_fwd, c_n_fwd, h_n_back, c_n_back]`.
    pub fn add_bidirlstm(
        &mut self,
        name: &str,
        input_names: [&str; 5],
        output_names: [&str; 5],
        params: BiLstmParams,
    ) -> Result<(), BuildError> {
        for peephole in [&params.peephole, &params.peephole_back]
            .into_iter()
            .flatten()
        {
            self.check_inputs(name, &[peephole])?;
        }
        self.add_layer(
            name,
            to_names(&input_names),
            to_names(&output_names),
            LayerParams::BiLstm(Box::new(params)),
        )
    }

    /// Add an elementwise activation layer.
    pub fn add_activation(
        &mut self,
        name: &str,
        activation: Activation,
        input_name: &str,
        output_name: &str,
    ) -> Result<(), BuildError> {
        self.add_layer(
            name,
            vec![input_name.to_string()],
            vec![output_name.to_string()],
            LayerParams::Activation(activation),
        )
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
