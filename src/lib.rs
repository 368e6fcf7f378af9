//! onnx-coreml converts the nodes of an [ONNX](https://onnx.ai) graph into
//! layers of a CoreML neural network.
//!
//! # Converting nodes
//!
//! The basic workflow is:
//!
//! 1. Create a [`Converter`], optionally customizing it via
//!    [`ConvertOptions`].
//! 2. Create a [`Graph`] containing the static shapes of tensors which are
//!    known ahead of time, and a [`NetworkBuilder`] with the network inputs
//!    declared.
//! 3. Call [`Converter::convert_node`] for each ONNX [`Node`], in dependency
//!    order.
//! 4. Take the layers from the builder with [`NetworkBuilder::into_layers`]
//!    and serialize them into a CoreML model.
//!
//! Parsing ONNX models and serializing CoreML models are outside the scope
//! of this crate.
//!
//! # Operators
//!
//! Converters are available for `Concat`, `Constant`, `ConstantOfShape`,
//! `Gather`, `LSTM`, `MatMul`, `Relu`, `Reshape`, `Shape`, `Slice`, `Split`,
//! `Squeeze`, `Transpose` and `Unsqueeze`. Custom converters can be added to
//! a [`ConverterRegistry`] and used with [`ConvertOptions::with_ops`].
//!
//! # Constant inputs
//!
//! Inputs whose values are known at conversion time (initializers) are stored
//! on the node. Converters which need them as tensors in the network emit a
//! load-constant layer for each, at most once per network, using
//! [`ops::load_constant_input`].
//!
//! # Diagnostics
//!
//! Conditions which prevent a node from being converted are returned as a
//! [`ConvertError`]. Features which are ignored or replaced with a default
//! are reported as warnings. The level of reporting can be configured with
//! [`ConvertOptions::diagnostic_level`] or the `ONNX_COREML_DIAGNOSTICS`
//! environment variable (`off`, `warn` or `info`).

mod builder;
mod diagnostics;
mod env;
mod errors;
mod graph;
mod op_registry;

pub mod ops;

#[cfg(test)]
mod test_util;

pub use builder::{
    Activation, BiLstmParams, BuildError, Dims, Layer, LayerParams, LstmParams, LstmWeights,
    MatMulWeights, NetworkBuilder, Producer, SliceParams, UniLstmParams,
};
pub use diagnostics::{DiagnosticLevel, Diagnostics};
pub use errors::{ConvertError, ConvertErrorKind, ErrorHandling};
pub use graph::{Attr, AttrValue, ConstantValue, Graph, Node};
pub use op_registry::{
    ConvertFunction, ConvertOptions, Converter, ConverterRegistry, DIAGNOSTICS_ENV_VAR,
    VALIDATE_NAMES_ENV_VAR,
};
