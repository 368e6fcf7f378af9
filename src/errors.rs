use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::builder::BuildError;
use crate::diagnostics::Diagnostics;
use crate::graph::Node;

/// Errors that occur when converting a node.
///
/// All of these are fatal: the conversion pass stops at the first error.
#[derive(Debug)]
pub struct ConvertError {
    inner: ConvertErrorImpl,
    node: Option<String>,
}

impl ConvertError {
    pub(crate) fn new(kind: ConvertErrorImpl) -> Self {
        Self {
            inner: kind,
            node: None,
        }
    }

    pub(crate) fn for_node(node: &str, kind: ConvertErrorImpl) -> Self {
        Self {
            inner: kind,
            node: Some(node.to_string()),
        }
    }

    pub(crate) fn attr_error(node: &str, attr: &str, error: impl AsRef<str>) -> Self {
        Self::for_node(
            node,
            ConvertErrorImpl::AttrError {
                attr: attr.to_string(),
                error: error.as_ref().to_string(),
            },
        )
    }

    /// Attach a node name to an error which does not have one.
    pub(crate) fn in_node(mut self, node: &str) -> Self {
        if self.node.is_none() {
            self.node = Some(node.to_string());
        }
        self
    }

    /// The name of the node that this error relates to.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Return the category of error.
    pub fn kind(&self) -> ConvertErrorKind {
        self.inner.kind()
    }
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(node) = self.node.as_deref() {
            write!(f, "in node \"{}\": {}", node, self.inner)
        } else {
            self.inner.fmt(f)
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.inner {
            ConvertErrorImpl::BuildError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BuildError> for ConvertError {
    fn from(val: BuildError) -> Self {
        Self::new(ConvertErrorImpl::BuildError(val))
    }
}

/// Categories of error when converting a node.
///
/// See [`ConvertError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ConvertErrorKind {
    /// No converter is registered for the node's operator type.
    UnsupportedOperator,

    /// The operator is supported, but not with this combination of
    /// attributes and input shapes.
    UnsupportedConfiguration,

    /// A weight that must be known at conversion time has no value.
    MissingInitializer,

    /// A required attribute is missing or has an invalid value.
    AttrError,

    /// A required input or output is missing from the node.
    InvalidNode,

    /// Adding a layer to the network failed.
    BuildError,
}

/// The internal implementation of [`ConvertError`].
#[derive(Debug)]
pub(crate) enum ConvertErrorImpl {
    UnsupportedOperator { op_type: String },
    UnsupportedConfiguration(String),
    MissingInitializer(String),
    AttrError { attr: String, error: String },
    MissingInput { index: usize, op_type: String },
    MissingOutput { index: usize, op_type: String },
    BuildError(BuildError),
}

impl ConvertErrorImpl {
    fn kind(&self) -> ConvertErrorKind {
        type Kind = ConvertErrorKind;

        match self {
            Self::UnsupportedOperator { .. } => Kind::UnsupportedOperator,
            Self::UnsupportedConfiguration(_) => Kind::UnsupportedConfiguration,
            Self::MissingInitializer(_) => Kind::MissingInitializer,
            Self::AttrError { .. } => Kind::AttrError,
            Self::MissingInput { .. } | Self::MissingOutput { .. } => Kind::InvalidNode,
            Self::BuildError(_) => Kind::BuildError,
        }
    }
}

impl Display for ConvertErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOperator { op_type } => {
                write!(f, "ONNX operator \"{}\" is not supported", op_type)
            }
            Self::UnsupportedConfiguration(msg) => write!(f, "unsupported configuration: {msg}"),
            Self::MissingInitializer(msg) => write!(f, "missing initializer: {msg}"),
            Self::AttrError { attr, error } => {
                write!(f, "error in attribute \"{}\": {}", attr, error)
            }
            Self::MissingInput { index, op_type } => {
                write!(f, "{op_type} is missing required input {index}")
            }
            Self::MissingOutput { index, op_type } => {
                write!(f, "{op_type} is missing required output {index}")
            }
            Self::BuildError(e) => write!(f, "network error: {e}"),
        }
    }
}

/// Reports problems found while converting nodes.
///
/// Fatal conditions are returned as a [`ConvertError`] for the caller to
/// propagate. Advisory conditions are logged through the [`Diagnostics`]
/// reporter and conversion continues with a default.
pub struct ErrorHandling {
    diagnostics: Diagnostics,
}

impl ErrorHandling {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Error for a node whose operator has no registered converter.
    pub fn unsupported_op(&self, node: &Node) -> ConvertError {
        ConvertError::for_node(
            node.name(),
            ConvertErrorImpl::UnsupportedOperator {
                op_type: node.op_type().to_string(),
            },
        )
    }

    /// Error for a supported operator used in a way the converter cannot
    /// express.
    pub fn unsupported_op_configuration(
        &self,
        node: &Node,
        message: std::fmt::Arguments<'_>,
    ) -> ConvertError {
        ConvertError::for_node(
            node.name(),
            ConvertErrorImpl::UnsupportedConfiguration(message.to_string()),
        )
    }

    /// Error for a weight tensor which has no compile-time value.
    pub fn missing_initializer(
        &self,
        node: &Node,
        message: std::fmt::Arguments<'_>,
    ) -> ConvertError {
        ConvertError::for_node(
            node.name(),
            ConvertErrorImpl::MissingInitializer(message.to_string()),
        )
    }

    /// Report a feature that is ignored or replaced by a default.
    pub fn unsupported_feature_warning(&self, node: &Node, message: std::fmt::Arguments<'_>) {
        self.diagnostics.warn(node.name(), message);
    }
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self::new(Diagnostics::new())
    }
}
