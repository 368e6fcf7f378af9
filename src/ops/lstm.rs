use rten_tensor::Tensor;
use smallvec::SmallVec;

use crate::builder::{
    Activation, BiLstmParams, LstmParams, LstmWeights, NetworkBuilder, UniLstmParams,
};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops::{load_constant_input, ConvertOp};

/// Cell clip threshold used when the `clip` attribute is not set.
const DEFAULT_CLIP: f32 = 500000.;

/// Rank of the input and output tensors of CoreML's LSTM layers.
const LSTM_RANK: usize = 5;

/// Split `data` into `N` equal chunks.
fn split_gates<const N: usize>(data: &[f32]) -> [Vec<f32>; N] {
    let size = data.len() / N;
    std::array::from_fn(|i| data[i * size..(i + 1) * size].to_vec())
}

fn add_vecs(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Re-pack the weights for one direction of an ONNX LSTM into CoreML's
/// per-gate layout.
///
/// `w` is the `[4 * hidden, input]` input weight matrix, `r` the
/// `[4 * hidden, hidden]` recurrence weight matrix and `b` the `[8 * hidden]`
/// bias vector, with gates in ONNX order (input, output, forget, cell). The
/// bias holds input-side biases followed by recurrence-side biases.
///
/// The result has gates in CoreML order (input, forget, output, cell), and
/// the two biases of each gate are summed.
pub fn repack_lstm_weights(w: &[f32], r: &[f32], b: Option<&[f32]>) -> LstmWeights {
    let [w_i, w_o, w_f, w_c] = split_gates::<4>(w);
    let [r_i, r_o, r_f, r_c] = split_gates::<4>(r);
    let bias = b.map(|b| {
        let [wb_i, wb_o, wb_f, wb_c, rb_i, rb_o, rb_f, rb_c] = split_gates::<8>(b);
        [
            add_vecs(&wb_i, &rb_i),
            add_vecs(&wb_f, &rb_f),
            add_vecs(&wb_o, &rb_o),
            add_vecs(&wb_c, &rb_c),
        ]
    });
    LstmWeights {
        input: [w_i, w_f, w_o, w_c],
        recurrent: [r_i, r_f, r_o, r_c],
        bias,
    }
}

/// Append trailing size-1 axes to `input` until it has rank 5.
///
/// Returns the name of the expanded tensor, which is `input` itself if it
/// already has rank 5.
fn expand_to_lstm_rank(
    builder: &mut NetworkBuilder,
    node_name: &str,
    input: &str,
    tag: &str,
    rank: usize,
) -> Result<String, ConvertError> {
    let mut current = input.to_string();
    for (i, axis) in (rank..LSTM_RANK).enumerate() {
        let output = format!("{}_expand_out{}_{}", input, tag, i);
        builder.add_expand_dims(
            &format!("{}_expand_in{}_{}", node_name, tag, i),
            &current,
            &output,
            &[axis as i64],
        )?;
        current = output;
    }
    Ok(current)
}

/// Convert to a CoreML `UniDirectionalLSTMLayer` or
/// `BiDirectionalLSTMLayer`.
///
/// CoreML's LSTM layers operate on rank 5 tensors, so the data and state
/// inputs are expanded before the LSTM and the outputs reshaped afterwards
/// to match ONNX's `[seq, directions, batch, hidden]` layout. Weights must be
/// constant.
pub struct Lstm;

impl ConvertOp for Lstm {
    fn op_type() -> &'static str {
        "LSTM"
    }

    fn convert(
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let name = node.name();

        if node.has_attr("activation_alpha") || node.has_attr("activation_beta") {
            err.unsupported_feature_warning(
                node,
                format_args!("activation_alpha and activation_beta are ignored"),
            );
        }

        let (inner_activation, cell_state_update_activation, output_activation) =
            match node.attr("activations") {
                Some(attr) => {
                    let names = attr.as_strings();
                    if names.len() < 3 {
                        return Err(err.unsupported_op_configuration(
                            node,
                            format_args!("expected at least 3 activations, got {}", names.len()),
                        ));
                    }
                    if names.len() == 6 {
                        err.unsupported_feature_warning(
                            node,
                            format_args!("both directions will use the forward activations"),
                        );
                    }
                    let activation = |name: &str| {
                        Activation::from_onnx_name(name).ok_or_else(|| {
                            err.unsupported_op_configuration(
                                node,
                                format_args!("unsupported activation \"{}\"", name),
                            )
                        })
                    };
                    (
                        activation(names[0].as_str())?,
                        activation(names[1].as_str())?,
                        activation(names[2].as_str())?,
                    )
                }
                None => (Activation::Sigmoid, Activation::Tanh, Activation::Tanh),
            };

        let clip = node.get_as::<f32>("clip").unwrap_or(DEFAULT_CLIP);
        let coupled_input_forget_gate = node.get_as::<bool>("input_forget").unwrap_or(false);

        let directions: usize = match node.get_as::<&str>("direction") {
            None | Some("forward") => 1,
            Some("bidirectional") => 2,
            Some(direction) => {
                return Err(err.unsupported_op_configuration(
                    node,
                    format_args!("unsupported direction \"{}\"", direction),
                ));
            }
        };

        if node.get_as::<i64>("layout").unwrap_or(0) != 0 {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("only the sequence-first layout is supported"),
            ));
        }
        if node.input(4).is_some() {
            err.unsupported_feature_warning(node, format_args!("sequence_lens is ignored"));
        }

        // Weights
        let x = node.require_input(0)?;
        let w_name = node.require_input(1)?;
        let r_name = node.require_input(2)?;
        let w = node.constant(w_name).ok_or_else(|| {
            err.missing_initializer(
                node,
                format_args!("weight tensor \"{}\" has no initializer", w_name),
            )
        })?;
        let r = node.constant(r_name).ok_or_else(|| {
            err.missing_initializer(
                node,
                format_args!("weight tensor \"{}\" has no initializer", r_name),
            )
        })?;
        let b = node.input_constant(3);

        let hidden_size = match node.get_as::<i64>("hidden_size") {
            Some(size) => size.max(0) as usize,
            None => r.shape().last().copied().unwrap_or(0),
        };
        if hidden_size == 0 {
            return Err(err.unsupported_op_configuration(node, format_args!("zero hidden size")));
        }

        if w.ndim() != 3 || w.shape()[0] != directions || w.shape()[1] != 4 * hidden_size {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!(
                    "W has shape {:?}, expected [{}, {}, input_size]",
                    w.shape(),
                    directions,
                    4 * hidden_size
                ),
            ));
        }
        let input_size = w.shape()[2];
        if input_size == 0 {
            return Err(err.unsupported_op_configuration(node, format_args!("zero input size")));
        }
        if r.shape() != [directions, 4 * hidden_size, hidden_size] {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!(
                    "R has shape {:?}, expected [{}, {}, {}]",
                    r.shape(),
                    directions,
                    4 * hidden_size,
                    hidden_size
                ),
            ));
        }
        if let Some(b) = b {
            if b.shape() != [directions, 8 * hidden_size] {
                return Err(err.unsupported_op_configuration(
                    node,
                    format_args!(
                        "B has shape {:?}, expected [{}, {}]",
                        b.shape(),
                        directions,
                        8 * hidden_size
                    ),
                ));
            }
        }

        let w_data = w.to_floats();
        let r_data = r.to_floats();
        let b_data = b.map(|b| b.to_floats());
        let (w_len, r_len) = (w_data.len() / directions, r_data.len() / directions);
        let b_len = 8 * hidden_size;
        let mut weights: SmallVec<[LstmWeights; 2]> = (0..directions)
            .map(|d| {
                repack_lstm_weights(
                    &w_data[d * w_len..(d + 1) * w_len],
                    &r_data[d * r_len..(d + 1) * r_len],
                    b_data.as_ref().map(|b| &b[d * b_len..(d + 1) * b_len]),
                )
            })
            .collect();

        // Input is `[seq, batch, input_size]`.
        let Some(x_shape) = graph.shape(x).map(|s| s.to_vec()) else {
            return Err(err.unsupported_op_configuration(
                node,
                format_args!("shape of input \"{}\" is unknown", x),
            ));
        };
        let x_rank = x_shape.len();

        let h_given = node.input(5);
        let c_given = node.input(6);
        let batch_size = match x_shape.get(1) {
            Some(&size) => size,
            None if h_given.is_none() || c_given.is_none() => {
                return Err(err.unsupported_op_configuration(
                    node,
                    format_args!("batch size of input \"{}\" is unknown", x),
                ));
            }
            None => 0,
        };

        // Initial hidden and cell states.
        let state_shape = [directions, batch_size, hidden_size];
        let mut load_zero_state = |suffix: &str, output: &str| {
            builder.add_load_constant_nd(
                &format!("{}_load_initial_{}", name, suffix),
                output,
                Tensor::<f32>::zeros(state_shape.as_slice()),
                &state_shape,
            )
        };
        let h_in = match h_given {
            Some(h) => h.to_string(),
            None => {
                let h = format!("{}_h_input", x);
                let suffix = if c_given.is_none() { "h_and_c" } else { "h" };
                load_zero_state(suffix, &h)?;
                h
            }
        };
        let c_in = match (c_given, h_given) {
            (Some(c), _) => c.to_string(),
            // Both states are zero, so share one tensor.
            (None, None) => h_in.clone(),
            (None, Some(_)) => {
                let c = format!("{}_c_input", x);
                load_zero_state("c", &c)?;
                c
            }
        };
        load_constant_input(builder, node, graph, 5, &format!("{}_load_initial_h", name))?;
        load_constant_input(builder, node, graph, 6, &format!("{}_load_initial_c", name))?;

        let x_5d = expand_to_lstm_rank(builder, name, x, "", x_rank)?;
        let h_5d = expand_to_lstm_rank(builder, name, &h_in, "_h", x_rank)?;
        let c_5d = if c_in == h_in {
            h_5d.clone()
        } else {
            expand_to_lstm_rank(builder, name, &c_in, "_c", x_rank)?
        };

        let peephole = node.input(7);
        if peephole.is_some() {
            load_constant_input(builder, node, graph, 7, &format!("{}_load_peephole", name))?;
        }

        // Outputs
        let y = node.require_output(0)?;
        let y_5d = format!("{}_5d_out", y);
        let out_h = node
            .output(1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}_h_output", y));
        let out_c = node
            .output(2)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}_c_output", y));
        let out_h_5d = format!("{}_5d", out_h);
        let out_c_5d = format!("{}_5d", out_c);

        let params = LstmParams {
            hidden_size,
            input_size,
            inner_activation,
            cell_state_update_activation,
            output_activation,
            cell_clip_threshold: clip,
            coupled_input_forget_gate,
            output_all: true,
            forget_bias: true,
        };

        // Peepholes are `[directions, 3 * hidden]` with one vector each for
        // the input, output and forget gates.
        let peephole_reshaped = match peephole {
            Some(peephole) => {
                let reshaped = format!("{}_reshaped", peephole);
                let mut shape: SmallVec<[i64; 3]> = SmallVec::new();
                if directions > 1 {
                    shape.push(directions as i64);
                }
                shape.extend([3, hidden_size as i64]);
                builder.add_reshape_static(
                    &format!("{}_peephole_reshape", name),
                    peephole,
                    &reshaped,
                    &shape,
                )?;
                Some((peephole, reshaped))
            }
            None => None,
        };

        if directions == 1 {
            let forward = weights.remove(0);
            builder.add_unilstm(
                name,
                [x_5d.as_str(), h_5d.as_str(), c_5d.as_str()],
                [y_5d.as_str(), out_h_5d.as_str(), out_c_5d.as_str()],
                UniLstmParams {
                    params,
                    weights: forward,
                    peephole: peephole_reshaped.map(|(_, reshaped)| reshaped),
                    reverse_input: false,
                },
            )?;
        } else {
            let backward = weights.remove(1);
            let forward = weights.remove(0);

            let (peephole_f, peephole_b) = match peephole_reshaped {
                Some((peephole, reshaped)) => {
                    let peephole_f = format!("{}_f", peephole);
                    let peephole_b = format!("{}_b", peephole);
                    builder.add_split_nd(
                        &format!("{}_peephole_split", name),
                        &reshaped,
                        &[&peephole_f, &peephole_b],
                        0,
                        None,
                    )?;
                    (Some(peephole_f), Some(peephole_b))
                }
                None => (None, None),
            };

            let h_f = format!("{}_f", h_in);
            let h_b = format!("{}_b", h_in);
            builder.add_split_nd(&format!("{}_split_h", name), &h_5d, &[&h_f, &h_b], 0, None)?;
            let (c_f, c_b) = if c_in == h_in {
                (h_f.clone(), h_b.clone())
            } else {
                let c_f = format!("{}_f", c_in);
                let c_b = format!("{}_b", c_in);
                builder.add_split_nd(
                    &format!("{}_split_c", name),
                    &c_5d,
                    &[&c_f, &c_b],
                    0,
                    None,
                )?;
                (c_f, c_b)
            };

            let out_h_f = format!("{}_f", out_h);
            let out_h_b = format!("{}_b", out_h);
            let out_c_f = format!("{}_f", out_c);
            let out_c_b = format!("{}_b", out_c);
            builder.add_bidirlstm(
                name,
                [
                    x_5d.as_str(),
                    h_f.as_str(),
                    c_f.as_str(),
                    h_b.as_str(),
                    c_b.as_str(),
                ],
                [
                    y_5d.as_str(),
                    out_h_f.as_str(),
                    out_c_f.as_str(),
                    out_h_b.as_str(),
                    out_c_b.as_str(),
                ],
                BiLstmParams {
                    params,
                    forward,
                    backward,
                    peephole: peephole_f,
                    peephole_back: peephole_b,
                },
            )?;

            builder.add_concat_nd(
                &format!("{}_concat_output_h", name),
                &[&out_h_f, &out_h_b],
                &out_h_5d,
                0,
            )?;
            builder.add_concat_nd(
                &format!("{}_concat_output_c", name),
                &[&out_c_f, &out_c_b],
                &out_c_5d,
                0,
            )?;
        }

        // The LSTM output is `[seq, batch, directions * hidden, 1, 1]`.
        // Separate the direction and hidden axes, drop the trailing unit axis
        // and move directions before batch.
        let y_reshaped = format!("{}_5d_reshaped", y);
        let y_4d = format!("{}_4d", y);
        builder.add_rank_preserving_reshape(
            &format!("{}_reshape_out", name),
            &y_5d,
            &y_reshaped,
            &[0, 0, directions as i64, -1, 0],
        )?;
        builder.add_squeeze(
            &format!("{}_squeeze_out", name),
            &y_reshaped,
            &y_4d,
            Some([-1].as_slice()),
        )?;
        builder.add_transpose(&format!("{}_transpose", name), &[0, 2, 1, 3], &y_4d, y)?;

        // Final states are `[directions, batch, hidden, 1, 1]`.
        builder.add_squeeze(
            &format!("{}_squeeze_out_h", name),
            &out_h_5d,
            &out_h,
            Some([-1, -2].as_slice()),
        )?;
        builder.add_squeeze(
            &format!("{}_squeeze_out_c", name),
            &out_c_5d,
            &out_c,
            Some([-1, -2].as_slice()),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use onnx_coreml_testing::TestCases;
    use rten_tensor::Tensor;

    use super::{repack_lstm_weights, Lstm};
    use crate::builder::{Activation, LayerParams};
    use crate::errors::ConvertErrorKind;
    use crate::graph::{ConstantValue, Graph, Node};
    use crate::test_util::{builder_for, convert, convert_into, expect_layer, layer_summary};

    const HIDDEN: usize = 3;
    const INPUT: usize = 4;

    /// Create an LSTM node with zero weights for `directions` directions.
    fn lstm_node(inputs: &[&str], directions: usize) -> Node {
        let w = Tensor::<f32>::zeros(&[directions, 4 * HIDDEN, INPUT]);
        let r = Tensor::<f32>::zeros(&[directions, 4 * HIDDEN, HIDDEN]);
        let b = Tensor::<f32>::zeros(&[directions, 8 * HIDDEN]);
        Node::new("LSTM")
            .with_name("lstm")
            .with_inputs(inputs)
            .with_outputs(&["y", "y_h", "y_c"])
            .with_attr("hidden_size", HIDDEN as i64)
            .with_constant("W", ConstantValue::from(w))
            .with_constant("R", ConstantValue::from(r))
            .with_constant("B", ConstantValue::from(b))
    }

    fn input_graph() -> Graph {
        Graph::new().with_shape("x", &[5, 2, INPUT])
    }

    #[test]
    fn test_repack_lstm_weights() {
        // One element per gate, in ONNX order (i, o, f, c).
        let w = [1., 2., 3., 4.];
        let r = [5., 6., 7., 8.];
        let b = [10., 20., 30., 40., 1., 2., 3., 4.];

        let weights = repack_lstm_weights(&w, &r, Some(&b));

        assert_eq!(weights.input, [vec![1.], vec![3.], vec![2.], vec![4.]]);
        assert_eq!(weights.recurrent, [vec![5.], vec![7.], vec![6.], vec![8.]]);
        assert_eq!(
            weights.bias,
            Some([vec![11.], vec![33.], vec![22.], vec![44.]])
        );

        let weights = repack_lstm_weights(&w, &r, None);
        assert_eq!(weights.bias, None);
    }

    #[test]
    fn test_repack_lstm_weights_matrices() {
        // Two rows per gate, with a row value of `gate * 10 + row`.
        let w: Vec<f32> = (0..4)
            .flat_map(|gate| (0..2).flat_map(move |row| [(gate * 10 + row) as f32; 3]))
            .collect();
        let r = vec![0.; 16];

        let weights = repack_lstm_weights(&w, &r, None);

        assert_eq!(weights.input[0], [0., 0., 0., 1., 1., 1.]);
        assert_eq!(weights.input[1], [20., 20., 20., 21., 21., 21.]);
        assert_eq!(weights.input[2], [10., 10., 10., 11., 11., 11.]);
        assert_eq!(weights.input[3], [30., 30., 30., 31., 31., 31.]);
        assert!(weights.recurrent.iter().all(|gate| gate.len() == 4));
    }

    #[test]
    fn test_lstm_forward() {
        let node = lstm_node(&["x", "W", "R", "B"], 1);
        let mut graph = input_graph();

        let builder = convert::<Lstm>(&node, &mut graph).unwrap();

        assert_eq!(
            layer_summary(builder.layers()),
            [
                ("loadConstantND", "lstm_load_initial_h_and_c"),
                ("expandDims", "lstm_expand_in_0"),
                ("expandDims", "lstm_expand_in_1"),
                ("expandDims", "lstm_expand_in_h_0"),
                ("expandDims", "lstm_expand_in_h_1"),
                ("uniDirectionalLSTM", "lstm"),
                ("rankPreservingReshape", "lstm_reshape_out"),
                ("squeeze", "lstm_squeeze_out"),
                ("transpose", "lstm_transpose"),
                ("squeeze", "lstm_squeeze_out_h"),
                ("squeeze", "lstm_squeeze_out_c"),
            ]
        );

        let initial = expect_layer(&builder, "lstm_load_initial_h_and_c");
        assert_eq!(initial.outputs(), ["x_h_input"]);
        assert!(matches!(
            initial.params(),
            LayerParams::LoadConstantNd { shape, .. } if shape == &[1, 2, HIDDEN]
        ));

        let lstm = expect_layer(&builder, "lstm");
        assert_eq!(
            lstm.inputs(),
            [
                "x_expand_out_1",
                "x_h_input_expand_out_h_1",
                "x_h_input_expand_out_h_1"
            ]
        );
        assert_eq!(lstm.outputs(), ["y_5d_out", "y_h_5d", "y_c_5d"]);
        let LayerParams::UniLstm(params) = lstm.params() else {
            panic!("expected unidirectional LSTM");
        };
        assert_eq!(params.params.hidden_size, HIDDEN);
        assert_eq!(params.params.input_size, INPUT);
        assert_eq!(params.params.cell_clip_threshold, 500000.);
        assert_eq!(params.params.inner_activation, Activation::Sigmoid);
        assert!(params.weights.bias.is_some());
        assert!(params.peephole.is_none());

        let reshape = expect_layer(&builder, "lstm_reshape_out");
        assert!(matches!(
            reshape.params(),
            LayerParams::RankPreservingReshape { target_shape }
                if target_shape.as_slice() == [0, 0, 1, -1, 0]
        ));
        assert_eq!(expect_layer(&builder, "lstm_transpose").outputs(), ["y"]);
        assert_eq!(
            expect_layer(&builder, "lstm_squeeze_out_h").outputs(),
            ["y_h"]
        );
        assert_eq!(
            expect_layer(&builder, "lstm_squeeze_out_c").outputs(),
            ["y_c"]
        );
    }

    #[test]
    fn test_lstm_forward_direction() {
        let node = lstm_node(&["x", "W", "R", "B"], 1).with_attr("direction", "forward");
        let mut graph = input_graph();

        let builder = convert::<Lstm>(&node, &mut graph).unwrap();

        let count = |kind: &str| builder.layers().iter().filter(|l| l.kind() == kind).count();
        assert_eq!(count("uniDirectionalLSTM"), 1);
        assert_eq!(count("biDirectionalLSTM"), 0);
        assert_eq!(expect_layer(&builder, "lstm").outputs().len(), 3);
        assert_eq!(expect_layer(&builder, "lstm_transpose").outputs(), ["y"]);
        assert!(node.unused_attrs().is_empty());
    }

    #[test]
    fn test_lstm_bidirectional() {
        let node = lstm_node(&["x", "W", "R", "B", "", "h0", "c0"], 2)
            .with_attr("direction", "bidirectional");
        let mut graph = input_graph();

        let builder = convert::<Lstm>(&node, &mut graph).unwrap();

        let count = |kind: &str| builder.layers().iter().filter(|l| l.kind() == kind).count();
        assert_eq!(count("biDirectionalLSTM"), 1);
        assert_eq!(count("uniDirectionalLSTM"), 0);
        assert_eq!(count("concatND"), 2);
        assert_eq!(count("loadConstantND"), 0);

        let split_c = expect_layer(&builder, "lstm_split_c");
        assert_eq!(split_c.inputs(), ["c0_expand_out_c_1"]);
        assert_eq!(split_c.outputs(), ["c0_f", "c0_b"]);

        let lstm = expect_layer(&builder, "lstm");
        assert_eq!(
            lstm.inputs(),
            ["x_expand_out_1", "h0_f", "c0_f", "h0_b", "c0_b"]
        );
        assert_eq!(
            lstm.outputs(),
            ["y_5d_out", "y_h_f", "y_c_f", "y_h_b", "y_c_b"]
        );

        let concat_h = expect_layer(&builder, "lstm_concat_output_h");
        assert_eq!(concat_h.inputs(), ["y_h_f", "y_h_b"]);
        assert_eq!(concat_h.outputs(), ["y_h_5d"]);

        assert!(matches!(
            expect_layer(&builder, "lstm_reshape_out").params(),
            LayerParams::RankPreservingReshape { target_shape }
                if target_shape.as_slice() == [0, 0, 2, -1, 0]
        ));
    }

    #[test]
    fn test_lstm_shared_initial_state() {
        let node = lstm_node(&["x", "W", "R", "B", "", "state", "state"], 2)
            .with_attr("direction", "bidirectional");
        let builder = convert::<Lstm>(&node, &mut input_graph()).unwrap();

        assert!(builder.layer("lstm_split_h").is_some());
        assert!(builder.layer("lstm_split_c").is_none());
        assert!(builder.layer("lstm_expand_in_c_0").is_none());
        assert_eq!(
            expect_layer(&builder, "lstm").inputs()[1..],
            ["state_f", "state_f", "state_b", "state_b"]
        );
    }

    #[test]
    fn test_lstm_one_missing_state() {
        let node = lstm_node(&["x", "W", "R", "B", "", "h0"], 1);
        let builder = convert::<Lstm>(&node, &mut input_graph()).unwrap();

        let initial_c = expect_layer(&builder, "lstm_load_initial_c");
        assert_eq!(initial_c.outputs(), ["x_c_input"]);
        assert_eq!(
            expect_layer(&builder, "lstm").inputs(),
            [
                "x_expand_out_1",
                "h0_expand_out_h_1",
                "x_c_input_expand_out_c_1"
            ]
        );
    }

    #[test]
    fn test_lstm_rank5_input() {
        let node = lstm_node(&["x", "W", "R"], 1);
        let mut graph = Graph::new().with_shape("x", &[5, 2, INPUT, 1, 1]);
        let builder = convert::<Lstm>(&node, &mut graph).unwrap();

        assert!(builder.layers().iter().all(|l| l.kind() != "expandDims"));
        assert_eq!(
            expect_layer(&builder, "lstm").inputs(),
            ["x", "x_h_input", "x_h_input"]
        );
    }

    #[test]
    fn test_lstm_peephole() {
        let node = lstm_node(&["x", "W", "R", "B", "", "", "", "P"], 1).with_constant(
            "P",
            ConstantValue::from(Tensor::<f32>::zeros(&[1, 3 * HIDDEN])),
        );
        let builder = convert::<Lstm>(&node, &mut input_graph()).unwrap();

        let load = expect_layer(&builder, "lstm_load_peephole");
        assert_eq!(load.outputs(), ["P"]);
        let reshape = expect_layer(&builder, "lstm_peephole_reshape");
        assert_eq!(reshape.outputs(), ["P_reshaped"]);
        let LayerParams::UniLstm(params) = expect_layer(&builder, "lstm").params() else {
            panic!("expected unidirectional LSTM");
        };
        assert_eq!(params.peephole.as_deref(), Some("P_reshaped"));
    }

    #[test]
    fn test_lstm_bidirectional_peephole() {
        let node = lstm_node(&["x", "W", "R", "B", "", "", "", "P"], 2)
            .with_attr("direction", "bidirectional")
            .with_constant(
                "P",
                ConstantValue::from(Tensor::<f32>::zeros(&[2, 3 * HIDDEN])),
            );
        let builder = convert::<Lstm>(&node, &mut input_graph()).unwrap();

        let split = expect_layer(&builder, "lstm_peephole_split");
        assert_eq!(split.inputs(), ["P_reshaped"]);
        assert_eq!(split.outputs(), ["P_f", "P_b"]);
        let LayerParams::BiLstm(params) = expect_layer(&builder, "lstm").params() else {
            panic!("expected bidirectional LSTM");
        };
        assert_eq!(params.peephole.as_deref(), Some("P_f"));
        assert_eq!(params.peephole_back.as_deref(), Some("P_b"));
    }

    #[test]
    fn test_lstm_activations() {
        #[derive(Debug)]
        struct Case {
            activations: &'static [&'static str],
            expected: Result<[Activation; 3], ConvertErrorKind>,
        }

        let cases = [
            Case {
                activations: &["Relu", "Tanh", "Sigmoid"],
                expected: Ok([Activation::Relu, Activation::Tanh, Activation::Sigmoid]),
            },
            Case {
                activations: &["Sigmoid", "Tanh", "Tanh", "Relu", "Relu", "Relu"],
                expected: Ok([Activation::Sigmoid, Activation::Tanh, Activation::Tanh]),
            },
            Case {
                activations: &["Sigmoid", "Tanh"],
                expected: Err(ConvertErrorKind::UnsupportedConfiguration),
            },
            Case {
                activations: &["Sigmoid", "Softsign", "Tanh"],
                expected: Err(ConvertErrorKind::UnsupportedConfiguration),
            },
        ];

        cases.test_each(|case| {
            let node =
                lstm_node(&["x", "W", "R"], 1).with_attr("activations", case.activations);
            let result = convert::<Lstm>(&node, &mut input_graph()).map(|builder| {
                let LayerParams::UniLstm(params) = expect_layer(&builder, "lstm").params() else {
                    panic!("expected unidirectional LSTM");
                };
                [
                    params.params.inner_activation,
                    params.params.cell_state_update_activation,
                    params.params.output_activation,
                ]
            });
            assert_eq!(result.map_err(|e| e.kind()), case.expected);
        })
    }

    #[test]
    fn test_lstm_errors() {
        #[derive(Debug)]
        struct Case {
            direction: Option<&'static str>,
            weight_directions: usize,
            inputs: &'static [&'static str],
            known_shape: bool,
            expected: ConvertErrorKind,
        }

        let cases = [
            Case {
                direction: Some("reverse"),
                weight_directions: 1,
                inputs: &["x", "W", "R"],
                known_shape: true,
                expected: ConvertErrorKind::UnsupportedConfiguration,
            },
            Case {
                direction: Some("sideways"),
                weight_directions: 1,
                inputs: &["x", "W", "R"],
                known_shape: true,
                expected: ConvertErrorKind::UnsupportedConfiguration,
            },
            // Bidirectional LSTM with weights for only one direction.
            Case {
                direction: Some("bidirectional"),
                weight_directions: 1,
                inputs: &["x", "W", "R"],
                known_shape: true,
                expected: ConvertErrorKind::UnsupportedConfiguration,
            },
            // Recurrence weights are not constant.
            Case {
                direction: None,
                weight_directions: 1,
                inputs: &["x", "W", "R_dynamic"],
                known_shape: true,
                expected: ConvertErrorKind::MissingInitializer,
            },
            Case {
                direction: None,
                weight_directions: 1,
                inputs: &["x", "W", "R"],
                known_shape: false,
                expected: ConvertErrorKind::UnsupportedConfiguration,
            },
        ];

        cases.test_each(|case| {
            let mut node = lstm_node(case.inputs, case.weight_directions);
            if let Some(direction) = case.direction {
                node = node.with_attr("direction", direction);
            }
            let mut graph = if case.known_shape {
                input_graph()
            } else {
                Graph::new()
            };
            let mut builder = builder_for(&node);

            let err = convert_into::<Lstm>(&mut builder, &node, &mut graph)
                .err()
                .unwrap();

            assert_eq!(err.kind(), case.expected);
            assert_eq!(err.node(), Some("lstm"));
            assert!(builder.is_empty());
        })
    }
}
