use rustc_hash::FxHashMap;

use crate::builder::NetworkBuilder;
use crate::diagnostics::{DiagnosticLevel, Diagnostics};
use crate::env::{env_diagnostic_level, env_flag};
use crate::errors::{ConvertError, ErrorHandling};
use crate::graph::{Graph, Node};
use crate::ops;
use crate::ops::ConvertOp;

/// Function which converts an ONNX node into CoreML layers.
pub type ConvertFunction =
    dyn Fn(&mut NetworkBuilder, &Node, &mut Graph, &ErrorHandling) -> Result<(), ConvertError>;

/// Environment variable which sets the default diagnostic level.
pub const DIAGNOSTICS_ENV_VAR: &str = "ONNX_COREML_DIAGNOSTICS";

/// Environment variable which sets whether layer inputs are validated.
pub const VALIDATE_NAMES_ENV_VAR: &str = "ONNX_COREML_VALIDATE_NAMES";

/// Registry mapping ONNX operator types to conversion functions.
///
/// New registries have no converters registered. To create a registry with
/// all built-in converters, use [`ConverterRegistry::with_all_ops`].
#[derive(Default)]
pub struct ConverterRegistry {
    /// Map from operator type (the `NodeProto.op_type` field) to conversion
    /// function.
    ops: FxHashMap<String, Box<ConvertFunction>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        ConverterRegistry {
            ops: FxHashMap::default(),
        }
    }

    /// Register the built-in converter for an operator, replacing any
    /// existing converter for the same operator type.
    pub fn register_op<Op: ConvertOp + 'static>(&mut self) {
        self.register_converter(Op::op_type(), Box::new(Op::convert));
    }

    /// Register a custom conversion function for an operator type.
    pub fn register_converter(&mut self, op_type: &str, convert: Box<ConvertFunction>) {
        self.ops.insert(op_type.to_string(), convert);
    }

    /// Look up the conversion function for an operator type.
    pub fn converter(&self, op_type: &str) -> Option<&ConvertFunction> {
        self.ops.get(op_type).map(|f| f.as_ref())
    }

    /// Return true if a converter is registered for `op_type`.
    pub fn supports(&self, op_type: &str) -> bool {
        self.ops.contains_key(op_type)
    }

    /// Return the supported operator types, in sorted order.
    pub fn op_types(&self) -> Vec<&str> {
        let mut op_types: Vec<&str> = self.ops.keys().map(|k| k.as_str()).collect();
        op_types.sort();
        op_types
    }

    /// Convert a node using the registered converter for its operator type.
    ///
    /// Attributes which the converter did not read are reported as warnings.
    pub fn convert_node(
        &self,
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
        err: &ErrorHandling,
    ) -> Result<(), ConvertError> {
        let convert = self
            .converter(node.op_type())
            .ok_or_else(|| err.unsupported_op(node))?;

        let prev_len = builder.len();
        convert(builder, node, graph, err).map_err(|e| e.in_node(node.name()))?;

        for attr in node.unused_attrs() {
            err.unsupported_feature_warning(
                node,
                format_args!("unsupported attribute \"{}\" was ignored", attr),
            );
        }
        err.diagnostics().info(
            node.name(),
            format_args!(
                "converted {} to {} layers",
                node.op_type(),
                builder.len() - prev_len
            ),
        );

        Ok(())
    }

    /// Create a registry with all built-in converters.
    pub fn with_all_ops() -> Self {
        let mut reg = ConverterRegistry::new();

        macro_rules! register_op {
            ($op:ident) => {
                reg.register_op::<ops::$op>()
            };
        }

        register_op!(Concat);
        register_op!(Constant);
        register_op!(ConstantOfShape);
        register_op!(Gather);
        register_op!(Lstm);
        register_op!(MatMul);
        register_op!(Relu);
        register_op!(Reshape);
        register_op!(Shape);
        register_op!(Slice);
        register_op!(Split);
        register_op!(Squeeze);
        register_op!(Transpose);
        register_op!(Unsqueeze);

        reg
    }
}

/// Options which customize how nodes are converted.
pub struct ConvertOptions {
    registry: ConverterRegistry,
    diagnostics: DiagnosticLevel,
    validate_names: bool,
}

impl ConvertOptions {
    /// Create a set of options with all converters enabled.
    pub fn with_all_ops() -> ConvertOptions {
        Self::with_ops(ConverterRegistry::with_all_ops())
    }

    /// Create a set of options with a custom set of converters.
    ///
    /// The diagnostic level and input validation default to the values of
    /// the `ONNX_COREML_DIAGNOSTICS` and `ONNX_COREML_VALIDATE_NAMES`
    /// environment variables, or `warn` and `true` if unset.
    pub fn with_ops(ops: ConverterRegistry) -> ConvertOptions {
        ConvertOptions {
            registry: ops,
            diagnostics: env_diagnostic_level(DIAGNOSTICS_ENV_VAR, DiagnosticLevel::Warn),
            validate_names: env_flag(VALIDATE_NAMES_ENV_VAR, true),
        }
    }

    /// Set the level at which diagnostics are reported.
    pub fn diagnostic_level(&mut self, level: DiagnosticLevel) -> &mut Self {
        self.diagnostics = level;
        self
    }

    /// Set whether builders check that every layer input has been produced
    /// by a network input or an earlier layer.
    pub fn validate_names(&mut self, validate: bool) -> &mut Self {
        self.validate_names = validate;
        self
    }

    pub fn build(self) -> Converter {
        Converter {
            registry: self.registry,
            errors: ErrorHandling::new(Diagnostics::with_level(self.diagnostics)),
            validate_names: self.validate_names,
        }
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::with_all_ops()
    }
}

/// Converts ONNX nodes into CoreML layers.
///
/// Nodes must be presented in dependency order, so that the inputs of each
/// node are produced by a network input or an earlier node.
pub struct Converter {
    registry: ConverterRegistry,
    errors: ErrorHandling,
    validate_names: bool,
}

impl Converter {
    /// Create a converter with all built-in converters and default options.
    pub fn new() -> Converter {
        ConvertOptions::with_all_ops().build()
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.errors.diagnostics()
    }

    /// Create an empty builder configured according to this converter's
    /// options.
    pub fn new_builder(&self) -> NetworkBuilder {
        NetworkBuilder::new().with_input_validation(self.validate_names)
    }

    /// Convert a single node, appending layers to `builder`.
    pub fn convert_node(
        &self,
        builder: &mut NetworkBuilder,
        node: &Node,
        graph: &mut Graph,
    ) -> Result<(), ConvertError> {
        self.registry.convert_node(builder, node, graph, &self.errors)
    }

    /// Convert a sequence of nodes, stopping at the first error.
    pub fn convert_nodes<'a>(
        &self,
        builder: &mut NetworkBuilder,
        nodes: impl IntoIterator<Item = &'a Node>,
        graph: &mut Graph,
    ) -> Result<(), ConvertError> {
        for node in nodes {
            self.convert_node(builder, node, graph)?;
        }
        Ok(())
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use onnx_coreml_testing::TestCases;

    use super::{ConvertOptions, ConverterRegistry};
    use crate::builder::{Activation, LayerParams};
    use crate::diagnostics::{DiagnosticLevel, Diagnostics};
    use crate::errors::{ConvertErrorKind, ErrorHandling};
    use crate::graph::{ConstantValue, Graph, Node};
    use crate::ops::Relu;
    use crate::test_util::{builder_for, layer_summary};

    fn warn_errors() -> ErrorHandling {
        ErrorHandling::new(Diagnostics::with_level(DiagnosticLevel::Warn))
    }

    #[test]
    fn test_with_all_ops() {
        let registry = ConverterRegistry::with_all_ops();
        assert_eq!(
            registry.op_types(),
            [
                "Concat",
                "Constant",
                "ConstantOfShape",
                "Gather",
                "LSTM",
                "MatMul",
                "Relu",
                "Reshape",
                "Shape",
                "Slice",
                "Split",
                "Squeeze",
                "Transpose",
                "Unsqueeze",
            ]
        );
        assert!(registry.converter("Relu").is_some());
        assert!(registry.converter("Conv").is_none());
    }

    #[test]
    fn test_convert_node_dispatch() {
        #[derive(Debug)]
        struct Case {
            op_type: &'static str,
            expected_kind: &'static str,
        }

        let cases = [
            Case {
                op_type: "Relu",
                expected_kind: "activation",
            },
            Case {
                op_type: "Shape",
                expected_kind: "getShape",
            },
            Case {
                op_type: "Transpose",
                expected_kind: "transpose",
            },
        ];

        cases.test_each(|case| {
            let registry = ConverterRegistry::with_all_ops();
            let node = Node::new(case.op_type)
                .with_name("node")
                .with_input("x")
                .with_output("y");
            let mut builder = builder_for(&node);
            let mut graph = Graph::new().with_shape("x", &[2, 3]);

            registry
                .convert_node(&mut builder, &node, &mut graph, &ErrorHandling::default())
                .unwrap();

            assert_eq!(
                layer_summary(builder.layers()),
                [(case.expected_kind, "node")]
            );
        })
    }

    #[test]
    fn test_unsupported_op() {
        let registry = ConverterRegistry::with_all_ops();
        let node = Node::new("Conv").with_input("x").with_output("y");
        let mut builder = builder_for(&node);

        let err = registry
            .convert_node(&mut builder, &node, &mut Graph::new(), &warn_errors())
            .err()
            .unwrap();

        assert_eq!(err.kind(), ConvertErrorKind::UnsupportedOperator);
        assert_eq!(err.node(), Some("y"));
        assert_eq!(
            err.to_string(),
            "in node \"y\": ONNX operator \"Conv\" is not supported"
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn test_unread_attribute_warning() {
        let registry = ConverterRegistry::with_all_ops();
        let node = Node::new("Relu")
            .with_name("relu")
            .with_input("x")
            .with_output("y")
            .with_attr("alpha", 0.5f32);
        let mut builder = builder_for(&node);
        let errors = warn_errors();

        registry
            .convert_node(&mut builder, &node, &mut Graph::new(), &errors)
            .unwrap();

        // The dispatcher has already reported this warning, so it is not
        // printed again.
        assert!(!errors.diagnostics().warn(
            "relu",
            format_args!("unsupported attribute \"alpha\" was ignored")
        ));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_build_errors_are_attributed_to_node() {
        let registry = ConverterRegistry::with_all_ops();
        let mut builder = crate::builder::NetworkBuilder::new();
        builder.add_input("x").unwrap();
        builder
            .add_activation("other", Activation::Relu, "x", "y")
            .unwrap();

        // Output "y" is already produced by another layer.
        let node = Node::new("Relu")
            .with_name("relu")
            .with_input("x")
            .with_output("y");
        let err = registry
            .convert_node(&mut builder, &node, &mut Graph::new(), &warn_errors())
            .err()
            .unwrap();

        assert_eq!(err.kind(), ConvertErrorKind::BuildError);
        assert_eq!(err.node(), Some("relu"));
    }

    #[test]
    fn test_register_converter() {
        let mut registry = ConverterRegistry::new();
        registry.register_op::<Relu>();
        registry.register_converter(
            "LeakyRelu",
            Box::new(|builder, node, _graph, _err| {
                builder.add_activation(
                    node.name(),
                    Activation::Relu,
                    node.require_input(0)?,
                    node.require_output(0)?,
                )?;
                Ok(())
            }),
        );

        let node = Node::new("LeakyRelu")
            .with_name("leaky")
            .with_input("x")
            .with_output("y");
        let mut builder = builder_for(&node);
        registry
            .convert_node(&mut builder, &node, &mut Graph::new(), &warn_errors())
            .unwrap();

        assert!(registry.supports("Relu"));
        assert!(!registry.supports("Concat"));
        assert!(matches!(
            builder.layers()[0].params(),
            LayerParams::Activation(Activation::Relu)
        ));
    }

    #[test]
    fn test_converter() {
        let mut options = ConvertOptions::with_all_ops();
        options
            .diagnostic_level(DiagnosticLevel::Info)
            .validate_names(false);
        let converter = options.build();
        assert_eq!(converter.diagnostics().level(), DiagnosticLevel::Info);

        // With validation disabled, inputs need not be declared.
        let nodes = [
            Node::new("Constant")
                .with_name("c")
                .with_output("shape")
                .with_attr("value", ConstantValue::from(vec![2i64, 3])),
            Node::new("Reshape")
                .with_name("reshape")
                .with_inputs(&["x", "shape"])
                .with_output("y")
                .with_constant("shape", vec![2i64, 3]),
        ];
        let mut builder = converter.new_builder();
        let mut graph = Graph::new().with_shape("x", &[6]);

        converter
            .convert_nodes(&mut builder, &nodes, &mut graph)
            .unwrap();

        assert_eq!(
            layer_summary(builder.layers()),
            [("loadConstantND", "c"), ("reshapeStatic", "reshape")]
        );
        assert!(graph.is_constant_loaded("shape"));
    }
}
