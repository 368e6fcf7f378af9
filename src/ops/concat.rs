use crate::builder::NetworkBuilder;
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{load_constant_input, ConvertOp};

/// Convert to a CoreML `ConcatNDLayer`.
///
/// Shape compatibility of the inputs is checked by the runtime, not here.
pub struct Concat;

impl ConvertOp for Concat {
    fn op_type() -> &'static str {
        "Concat"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let axis = node.require_attr("axis")?.as_i64();
        for i in 0..node.inputs().len() {
            let layer_name = format!("{}_load_constant_{}", node.name(), i);
            load_constant_input(builder, node, graph, i, &layer_name)?;
        }
        builder.add_concat_nd(node.name(), node.inputs(), node.require_output(0)?, axis)?;
        Ok(())
    }
}
