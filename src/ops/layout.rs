use crate::builder::{Dims, NetworkBuilder};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{ints_from_attr_or_input, require_constant_input, ConvertOp};

/// Convert to one of CoreML's reshape layers.
///
/// A constant target shape whose rank equals the input's becomes a
/// `RankPreservingReshapeLayer`. A lower-rank target shape made up only of
/// `0` and `-1` entries is expressed as a rank-preserving reshape followed by
/// a squeeze, because `ReshapeStaticLayer` does not support `0` entries.
/// Other constant shapes use `ReshapeStaticLayer`, and shapes computed at
/// runtime use `ReshapeDynamicLayer`.
pub struct Reshape;

impl ConvertOp for Reshape {
    fn op_type() -> &'static str {
        "Reshape"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let data = node.require_input(0)?;
        let output = node.require_output(0)?;

        // Reshape-1 has a `shape` attribute. Later versions take it as an input.
        let target_shape = node
            .input_constant(1)
            .map(|c| c.to_ints())
            .or_else(|| node.get_as::<&[i64]>("shape").map(|s| s.to_vec()));

        let Some(target_shape) = target_shape else {
            let shape = node.require_input(1)?;
            builder.add_reshape_dynamic(node.name(), &[data, shape], output)?;
            return Ok(());
        };

        if target_shape.is_empty() {
            builder.add_reshape_static(node.name(), data, output, &target_shape)?;
            return Ok(());
        }

        let Some(input_rank) = graph.rank(data) else {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("shape of input \"{}\" is unknown", data),
            ));
        };
        let output_rank = target_shape.len();

        if output_rank == input_rank {
            builder.add_rank_preserving_reshape(node.name(), data, output, &target_shape)?;
            return Ok(());
        }

        if output_rank < input_rank {
            let wildcards = target_shape.iter().filter(|&&d| d == -1).count();
            if wildcards > 1 {
                return Err(err.unsupported_op_configuration(
                    node,
                    format_args!(
                        "at most one dimension of the new shape can be -1, found {}",
                        wildcards
                    ),
                ));
            }

            if target_shape.iter().all(|&d| d == 0 || d == -1) {
                // Keep entries up to the wildcard and pad with 1s to the
                // input's rank, then squeeze the padding away.
                let mut padded = Dims::new();
                for &dim in &target_shape {
                    padded.push(dim);
                    if dim == -1 {
                        break;
                    }
                }
                padded.resize(input_rank, 1);

                let preserved = format!("{}_reshape_dim_preserved", output);
                builder.add_rank_preserving_reshape(
                    &format!("{}_reshape_preserving", node.name()),
                    data,
                    &preserved,
                    &padded,
                )?;

                let squeeze_axes: Dims =
                    (output_rank as i64 - input_rank as i64..0).rev().collect();
                builder.add_squeeze(
                    node.name(),
                    &preserved,
                    output,
                    Some(squeeze_axes.as_slice()),
                )?;
                return Ok(());
            }
        }

        builder.add_reshape_static(node.name(), data, output, &target_shape)?;
        Ok(())
    }
}

/// Convert to a CoreML `SqueezeLayer`.
pub struct Squeeze;

impl ConvertOp for Squeeze {
    fn op_type() -> &'static str {
        "Squeeze"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        require_constant_input(node, err, 1, "axes")?;
        let axes = ints_from_attr_or_input(node, "axes", 1);
        builder.add_squeeze(
            node.name(),
            node.require_input(0)?,
            node.require_output(0)?,
            axes.as_deref(),
        )?;
        Ok(())
    }
}

/// Convert to a CoreML `ExpandDimsLayer`.
pub struct Unsqueeze;

impl ConvertOp for Unsqueeze {
    fn op_type() -> &'static str {
        "Unsqueeze"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        require_constant_input(node, err, 1, "axes")?;
        let axes = ints_from_attr_or_input(node, "axes", 1).ok_or_else(|| {
            ConvertError::attr_error(node.name(), "axes", "required attribute missing")
        })?;
        builder.add_expand_dims(
            node.name(),
            node.require_input(0)?,
            node.require_output(0)?,
            &axes,
        )?;
        Ok(())
    }
}

/// Convert to a CoreML `GetShapeLayer`.
pub struct Shape;

impl ConvertOp for Shape {
    fn op_type() -> &'static str {
        "Shape"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        _graph: &mut Graph,
        _err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        builder.add_get_shape(node.name(), node.require_input(0)?, node.require_output(0)?)?;
        Ok(())
    }
}

/// Convert to a CoreML `TransposeLayer`.
pub struct Transpose;

impl ConvertOp for Transpose {
    fn op_type() -> &'static str {
        "Transpose"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let input = node.require_input(0)?;
        let perm: Dims = match node.get_as::<&[i64]>("perm") {
            Some(perm) if !perm.is_empty() => perm.into(),
            _ => {
                // The default permutation reverses the dimensions.
                let Some(rank) = graph.rank(input) else {
                    return Err(err.unsupported_op_configuration(
                        node,
                        format_args!("perm is not set and the rank of \"{}\" is unknown", input),
                    ));
                };
                (1..=rank as i64).map(|i| -i).collect()
            }
        };
        builder.add_transpose(node.name(), &perm, input, node.require_output(0)?)?;
        Ok(())
    }
}
