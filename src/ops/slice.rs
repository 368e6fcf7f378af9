use crate::builder::{NetworkBuilder, SliceParams};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{ints_from_attr_or_input, resolve_axis, ConvertOp};

/// End indices at or above this value select everything up to the end of an
/// axis. Exporters typically use `i64::MAX` or `i32::MAX`.
const END_OF_AXIS: i64 = 1 << 30;

/// Convert to a CoreML `SliceStaticLayer`.
///
/// `starts`, `ends`, `axes` and `steps` are attributes before opset 10 and
/// constant inputs afterwards.
pub struct Slice;

impl ConvertOp for Slice {
    fn op_type() -> &'static str {
        "Slice"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let data = node.require_input(0)?;
        let output = node.require_output(0)?;

        let Some(data_shape) = graph.shape(data) else {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("shape of input \"{}\" is unknown", data),
            ));
        };
        let rank = data_shape.len();

        let required = |name: &'static str, input: usize| {
            ints_from_attr_or_input(node, name, input).ok_or_else(|| {
                ConvertError::attr_error(node.name(), name, "required attribute missing")
            })
        };
        let starts = required("starts", 1)?;
        let ends = required("ends", 2)?;
        let axes = ints_from_attr_or_input(node, "axes", 3)
            .unwrap_or_else(|| (0..starts.len() as i64).collect());
        let steps =
            ints_from_attr_or_input(node, "steps", 4).unwrap_or_else(|| vec![1; axes.len()]);

        if [ends.len(), axes.len(), steps.len()]
            .iter()
            .any(|&len| len != starts.len())
        {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!(
                    "starts, ends, axes and steps have different lengths ({}, {}, {}, {})",
                    starts.len(),
                    ends.len(),
                    axes.len(),
                    steps.len()
                ),
            ));
        }

        let mut params = SliceParams {
            begin_ids: vec![0; rank],
            end_ids: vec![0; rank],
            strides: vec![1; rank],
            begin_masks: vec![true; rank],
            end_masks: vec![true; rank],
        };

        for (i, &axis) in axes.iter().enumerate() {
            let Some(dim) = resolve_axis(rank, axis) else {
                return Err(err.unsupported_op_configuration(
                    node,
                    format_args!("axis {} is invalid for input of rank {}", axis, rank),
                ));
            };
            let (start, end) = (starts[i], ends[i]);

            params.begin_ids[dim] = start;
            params.end_ids[dim] = end;
            params.strides[dim] = steps[i];

            if start != 0 {
                params.begin_masks[dim] = false;
            }
            if end < END_OF_AXIS && end < data_shape[dim] as i64 {
                params.end_masks[dim] = false;
            }
        }

        builder.add_slice_static(node.name(), data, output, params)?;
        Ok(())
    }
}
