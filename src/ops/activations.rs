use crate::builder::{Activation, NetworkBuilder};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::ConvertOp;

/// Convert to a CoreML `ActivationReLU` layer.
pub struct Relu;

impl ConvertOp for Relu {
    fn op_type() -> &'static str {
        "Relu"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        builder.add_activation(
            node.name(),
            Activation::Relu,
            node.require_input(0)?,
            node.require_output(0)?,
        )?;
        Ok(())
    }
}
