use crate::builder::{Layer, NetworkBuilder};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::ConvertOp;

/// Create a builder in which the non-constant inputs of `node` are declared
/// as network inputs.
pub fn builder_for(node: &Node) -> NetworkBuilder {
    let mut builder = NetworkBuilder::new();
    for name in node.inputs() {
        if name.is_empty() || node.constant(name).is_some() || builder.has_tensor(name) {
            continue;
        }
        builder
            .add_input(name)
            .expect("input should not already exist");
    }
    builder
}

/// Convert `node` with `Op` into `builder`.
pub fn convert_into<Op: ConvertOp>(
    builder: &mut NetworkBuilder,
    node: &Node,
    graph: &mut Graph,
) -> Result<(), ConvertError> {
    Op::convert(builder, node, graph, &ErrorHandling::default())
}

/// Convert `node` with `Op` into a new builder, and return the builder.
pub fn convert<Op: ConvertOp>(
    node: &Node,
    graph: &mut Graph,
) -> Result<NetworkBuilder, ConvertError> {
    let mut builder = builder_for(node);
    convert_into::<Op>(&mut builder, node, graph)?;
    Ok(builder)
}

/// Return the `(kind, name)` of each layer, in order.
pub fn layer_summary(layers: &[Layer]) -> Vec<(&'static str, &str)> {
    layers.iter().map(|l| (l.kind(), l.name())).collect()
}

/// Find a layer by name, panicking if it doesn't exist.
pub fn expect_layer<'a>(builder: &'a NetworkBuilder, name: &str) -> &'a Layer {
    builder
        .layer(name)
        .unwrap_or_else(|| panic!("no layer named \"{}\"", name))
}
