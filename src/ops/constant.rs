use crate::builder::NetworkBuilder;
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::ConvertOp;

/// Convert to a CoreML `LoadConstantNDLayer`.
pub struct Constant;

impl ConvertOp for Constant {
    fn op_type() -> &'static str {
        "Constant"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let value = node
            .require_attr("value")?
            .as_tensor()
            .ok_or_else(|| ConvertError::attr_error(node.name(), "value", "expected a tensor"))?;
        let output = node.require_output(0)?;

        builder.add_load_constant_nd(node.name(), output, value.to_float(), &value.load_shape())?;
        graph.mark_constant_loaded(output);

        Ok(())
    }
}

/// Convert to a CoreML `FillStaticLayer` if the shape is known, or a
/// `FillDynamicLayer` otherwise.
pub struct ConstantOfShape;

impl ConvertOp for ConstantOfShape {
    fn op_type() -> &'static str {
        "ConstantOfShape"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let value = node
            .attr("value")
            .and_then(|v| v.as_tensor())
            .and_then(|t| t.first_float())
            .unwrap_or(0.);
        let input = node.require_input(0)?;
        let output = node.require_output(0)?;

        if let Some(shape) = node.constant(input) {
            let mut target_shape = shape.to_ints();
            // An empty shape describes a scalar, which CoreML represents as [1].
            if target_shape.is_empty() {
                target_shape.push(1);
            }
            builder.add_fill_static(node.name(), output, &target_shape, value)?;
        } else {
            builder.add_fill_dynamic(node.name(), input, output, value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;

    use super::{Constant, ConstantOfShape};
    use crate::builder::LayerParams;
    use crate::errors::ConvertErrorKind;
    use crate::graph::{ConstantValue, Graph, Node};
    use crate::ops::Concat;
    use crate::test_util::{builder_for, convert, convert_into, layer_summary};

    #[test]
    fn test_constant() {
        let value = Tensor::from_data(&[2, 2], vec![1i64, 2, 3, 4]);
        let node = Node::new("Constant")
            .with_name("const")
            .with_output("c")
            .with_attr("value", ConstantValue::from(value));
        let mut graph = Graph::new();

        let builder = convert::<Constant>(&node, &mut graph).unwrap();

        assert_eq!(builder.len(), 1);
        let layer = &builder.layers()[0];
        assert_eq!(layer.name(), "const");
        assert_eq!(layer.outputs(), ["c"]);
        let LayerParams::LoadConstantNd { shape, value } = layer.params() else {
            panic!("expected constant layer");
        };
        assert_eq!(shape, &[2, 2]);
        assert_eq!(value.to_vec(), [1., 2., 3., 4.]);
        assert!(graph.is_constant_loaded("c"));
    }

    #[test]
    fn test_constant_scalar() {
        let node = Node::new("Constant")
            .with_output("c")
            .with_attr("value", ConstantValue::from(3.0f32));

        let builder = convert::<Constant>(&node, &mut Graph::new()).unwrap();

        assert!(matches!(
            builder.layers()[0].params(),
            LayerParams::LoadConstantNd { shape, .. } if shape == &[1]
        ));
    }

    #[test]
    fn test_constant_consumed_by_concat() {
        let constant = Node::new("Constant")
            .with_name("c")
            .with_output("k")
            .with_attr("value", ConstantValue::from(vec![1.0f32, 2.0]));
        let concat = Node::new("Concat")
            .with_name("cat")
            .with_inputs(&["x", "k"])
            .with_output("y")
            .with_attr("axis", 0i64)
            .with_constant("k", vec![1.0f32, 2.0]);
        let mut graph = Graph::new();
        let mut builder = builder_for(&concat);

        convert_into::<Constant>(&mut builder, &constant, &mut graph).unwrap();
        convert_into::<Concat>(&mut builder, &concat, &mut graph).unwrap();

        // The value is loaded once, by the Constant node.
        assert_eq!(
            layer_summary(builder.layers()),
            [("loadConstantND", "c"), ("concatND", "cat")]
        );
        assert_eq!(builder.layers()[1].inputs(), ["x", "k"]);
    }

    #[test]
    fn test_constant_missing_value() {
        let node = Node::new("Constant")
            .with_output("c")
            .with_attr("value", 3i64);
        let err = convert::<Constant>(&node, &mut Graph::new()).err().unwrap();
        assert_eq!(err.kind(), ConvertErrorKind::AttrError);
    }

    #[test]
    fn test_constant_of_shape_static() {
        let node = Node::new("ConstantOfShape")
            .with_name("fill")
            .with_input("shape")
            .with_output("y")
            .with_constant("shape", vec![2i64, 3])
            .with_attr("value", ConstantValue::from(vec![1.5f32]));

        let builder = convert::<ConstantOfShape>(&node, &mut Graph::new()).unwrap();

        assert_eq!(builder.len(), 1);
        let layer = &builder.layers()[0];
        assert!(layer.inputs().is_empty());
        assert!(matches!(
            layer.params(),
            LayerParams::FillStatic { target_shape, value }
                if target_shape.as_slice() == [2, 3] && *value == 1.5
        ));
    }

    #[test]
    fn test_constant_of_shape_empty_shape() {
        let node = Node::new("ConstantOfShape")
            .with_name("fill")
            .with_input("shape")
            .with_output("y")
            .with_constant("shape", Vec::<i64>::new())
            .with_attr("value", ConstantValue::from(vec![2.0f32]));

        let builder = convert::<ConstantOfShape>(&node, &mut Graph::new()).unwrap();

        assert_eq!(builder.len(), 1);
        assert!(matches!(
            builder.layers()[0].params(),
            LayerParams::FillStatic { target_shape, value }
                if target_shape.as_slice() == [1] && *value == 2.
        ));
    }

    #[test]
    fn test_constant_of_shape_dynamic() {
        let node = Node::new("ConstantOfShape")
            .with_name("fill")
            .with_input("shape")
            .with_output("y");

        let builder = convert::<ConstantOfShape>(&node, &mut Graph::new()).unwrap();

        let layer = &builder.layers()[0];
        assert_eq!(layer.inputs(), ["shape"]);
        assert!(matches!(
            layer.params(),
            LayerParams::FillDynamic { value } if *value == 0.
        ));
    }
}
