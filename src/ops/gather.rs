use crate::builder::NetworkBuilder;
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{load_constant_input, ConvertOp};

/// Convert to a CoreML `GatherLayer`.
pub struct Gather;

impl ConvertOp for Gather {
    fn op_type() -> &'static str {
        "Gather"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        if node.inputs().len() != 2 {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("Gather expects 2 inputs, got {}", node.inputs().len()),
            ));
        }
        let axis = node.get_as::<i64>("axis").unwrap_or(0);
        let data = node.require_input(0)?;
        let indices = node.require_input(1)?;
        let output = node.require_output(0)?;
        let name = node.name();

        load_constant_input(builder, node, graph, 0, &format!("{name}_load_data"))?;
        load_constant_input(builder, node, graph, 1, &format!("{name}_load_indices"))?;
        builder.add_gather(name, &[data, indices], output, axis)?;

        Ok(())
    }
}
