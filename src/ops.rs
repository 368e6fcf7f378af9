//! Converters for individual ONNX operators.
//!
//! Each supported operator has a unit type implementing [`ConvertOp`]. The
//! converter reads the node's attributes and inputs, consults the shared
//! [`Graph`] context for static shapes and already-loaded constants, and
//! appends one or more layers to the [`NetworkBuilder`].

use crate::builder::NetworkBuilder;
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};

mod activations;
mod concat;
mod constant;
mod gather;
mod layout;
mod lstm;
mod matmul;
mod slice;
mod split;

pub use activations::Relu;
pub use concat::Concat;
pub use constant::{Constant, ConstantOfShape};
pub use gather::Gather;
pub use layout::{Reshape, Shape, Squeeze, Transpose, Unsqueeze};
pub use lstm::{repack_lstm_weights, Lstm};
pub use matmul::MatMul;
pub use slice::Slice;
pub use split::Split;

/// Conversion of an ONNX operator to CoreML layers.
pub trait ConvertOp {
    /// Name of the ONNX operator, as found in `NodeProto.op_type`.
    fn op_type() -> &'static str;

    /// Append the layers for `node` to `builder`.
    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError>;
}

/// Emit a constant layer for the index'th input of `node` if its value is
/// known at conversion time and it has not been loaded already.
///
/// The constant layer's output has the same name as the input, so later
/// layers can refer to it as if it were computed at runtime. Returns true if
/// a layer was added.
pub fn load_constant_input(
    builder: &mut NetworkBuilder,
    node: &Node,
    graph: &mut Graph,
    index: usize,
    layer_name: &str,
) -> Result<bool, ConvertError> {
    let Some(name) = node.input(index) else {
        return Ok(false);
    };
    let Some(value) = node.constant(name) else {
        return Ok(false);
    };
    if graph.is_constant_loaded(name) {
        return Ok(false);
    }
    builder.add_load_constant_nd(layer_name, name, value.to_float(), &value.load_shape())?;
    graph.mark_constant_loaded(name);
    Ok(true)
}

/// Read a list of ints from an attribute or, for operators whose later
/// opsets moved the attribute to an input, from a constant input.
pub(crate) fn ints_from_attr_or_input(
    node: &Node,
    attr: &'static str,
    input: usize,
) -> Option<Vec<i64>> {
    node.attr(attr)
        .map(|a| a.as_ints().to_vec())
        .or_else(|| node.input_constant(input).map(|c| c.to_ints()))
}

/// Return an error if the index'th input is present but its value is only
/// known at runtime.
pub(crate) fn require_constant_input(
    node: &Node,
    err: &ErrorHandling,
    index: usize,
    what: &str,
) -> Result<(), ConvertError> {
    if let Some(name) = node.input(index) {
        if !node.is_constant_input(index) {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("{} input \"{}\" must be a constant", what, name),
            ));
        }
    }
    Ok(())
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
pub(crate) fn resolve_axis(ndim: usize, axis: i64) -> Option<usize> {
    let rank = ndim as i64;
    if axis < -rank || axis >= rank {
        return None;
    }
    let resolved = if axis < 0 { axis + rank } else { axis };
    Some(resolved as usize)
}
