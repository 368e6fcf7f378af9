use crate::builder::{MatMulWeights, NetworkBuilder};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{load_constant_input, ConvertOp};

/// Convert to a CoreML `BatchedMatMulLayer`.
///
/// A constant 2D right-hand operand is stored in the layer as a weight
/// matrix. CoreML only accepts 2D weights, so other constant operands are
/// loaded as separate constant layers.
pub struct MatMul;

impl ConvertOp for MatMul {
    fn op_type() -> &'static str {
        "MatMul"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let a = node.require_input(0)?;
        let b = node.require_input(1)?;
        let output = node.require_output(0)?;

        let name = node.name();
        load_constant_input(builder, node, graph, 0, &format!("{name}_const_input"))?;

        match node.constant(b) {
            Some(weights) if weights.ndim() == 2 => {
                let weights = MatMulWeights {
                    rows: weights.shape()[0],
                    columns: weights.shape()[1],
                    values: weights.to_floats(),
                };
                builder.add_batched_mat_mul(name, &[a], output, Some(weights))?;
            }
            _ => {
                let layer_name = format!("{name}_const_weight_input");
                load_constant_input(builder, node, graph, 1, &layer_name)?;
                builder.add_batched_mat_mul(name, &[a, b], output, None)?;
            }
        }

        Ok(())
    }
}
