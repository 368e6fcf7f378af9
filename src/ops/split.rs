use crate::builder::NetworkBuilder;
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{ints_from_attr_or_input, require_constant_input, ConvertOp};

/// Convert to a CoreML `SplitNDLayer`.
pub struct Split;

impl ConvertOp for Split {
    fn op_type() -> &'static str {
        "Split"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let axis = node.get_as::<i64>("axis").unwrap_or(0);
        require_constant_input(node, err, 1, "split")?;
        let split = ints_from_attr_or_input(node, "split", 1);
        builder.add_split_nd(
            node.name(),
            node.require_input(0)?,
            node.outputs(),
            axis,
            split.as_deref(),
        )?;
        Ok(())
    }
}
