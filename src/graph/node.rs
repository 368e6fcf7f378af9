use std::cell::RefCell;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::ConstantValue;
use crate::errors::{ConvertError, ConvertErrorImpl};

/// Value of an ONNX node attribute.
#[derive(Clone, Debug)]
pub enum AttrValue {
    Float(f32),
    Floats(Vec<f32>),
    Int(i64),
    Ints(Vec<i64>),
    String(String),
    Strings(Vec<String>),
    Tensor(ConstantValue),
}

macro_rules! attr_value_from {
    ($variant:ident, $from:ty) => {
        impl From<$from> for AttrValue {
            fn from(val: $from) -> Self {
                Self::$variant(val)
            }
        }
    };
}

attr_value_from!(Float, f32);
attr_value_from!(Floats, Vec<f32>);
attr_value_from!(Int, i64);
attr_value_from!(Ints, Vec<i64>);
attr_value_from!(String, String);
attr_value_from!(Strings, Vec<String>);
attr_value_from!(Tensor, ConstantValue);

impl From<bool> for AttrValue {
    fn from(val: bool) -> Self {
        Self::Int(val as i64)
    }
}

impl From<&str> for AttrValue {
    fn from(val: &str) -> Self {
        Self::String(val.to_string())
    }
}

impl From<&[&str]> for AttrValue {
    fn from(val: &[&str]) -> Self {
        Self::Strings(val.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Clone, Debug)]
struct Attribute {
    name: String,
    value: AttrValue,
}

/// A single operator node from an ONNX graph.
///
/// Nodes refer to their inputs and outputs by tensor name. Some inputs may
/// have values which are known at conversion time (initializers or the
/// outputs of constant-folded subgraphs). These are available via
/// [`constant`](Node::constant).
///
/// A node records which attributes have been read while it is converted.
/// This enables the dispatcher to report attributes that a converter does
/// not support.
#[derive(Clone, Debug, Default)]
pub struct Node {
    name: String,
    op_type: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attrs: Vec<Attribute>,
    input_tensors: FxHashMap<String, ConstantValue>,
    used_attrs: RefCell<SmallVec<[&'static str; 6]>>,
}

impl Node {
    pub fn new(op_type: &str) -> Node {
        Node {
            op_type: op_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        self.inputs.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn with_outputs(mut self, names: &[&str]) -> Self {
        self.outputs.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.push(Attribute {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Record the compile-time value of the input named `name`.
    ///
    /// This does not add `name` to the input list.
    pub fn with_constant(mut self, name: &str, value: impl Into<ConstantValue>) -> Self {
        self.input_tensors.insert(name.to_string(), value.into());
        self
    }

    /// Return the node's name.
    ///
    /// ONNX node names are optional. Unnamed nodes are identified by their
    /// first output instead, which is unique within the graph.
    pub fn name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else {
            self.outputs
                .first()
                .map(|s| s.as_str())
                .unwrap_or(&self.op_type)
        }
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Return the name of the index'th input.
    ///
    /// Returns `None` if the input is absent. ONNX uses an empty name for
    /// optional inputs that are omitted before later inputs.
    pub fn input(&self, index: usize) -> Option<&str> {
        self.inputs
            .get(index)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Return the name of the index'th output, or `None` if absent.
    pub fn output(&self, index: usize) -> Option<&str> {
        self.outputs
            .get(index)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Return the name of the index'th input, or an error if absent.
    pub fn require_input(&self, index: usize) -> Result<&str, ConvertError> {
        self.input(index).ok_or_else(|| {
            ConvertError::for_node(
                self.name(),
                ConvertErrorImpl::MissingInput {
                    index,
                    op_type: self.op_type.clone(),
                },
            )
        })
    }

    /// Return the name of the index'th output, or an error if absent.
    pub fn require_output(&self, index: usize) -> Result<&str, ConvertError> {
        self.output(index).ok_or_else(|| {
            ConvertError::for_node(
                self.name(),
                ConvertErrorImpl::MissingOutput {
                    index,
                    op_type: self.op_type.clone(),
                },
            )
        })
    }

    /// Return the compile-time value of the tensor named `name`, if known.
    pub fn constant(&self, name: &str) -> Option<&ConstantValue> {
        self.input_tensors.get(name)
    }

    /// Return the compile-time value of the index'th input, if known.
    pub fn input_constant(&self, index: usize) -> Option<&ConstantValue> {
        self.input(index).and_then(|name| self.constant(name))
    }

    /// Return true if the index'th input has a compile-time value.
    pub fn is_constant_input(&self, index: usize) -> bool {
        self.input_constant(index).is_some()
    }

    /// Get an optional attribute.
    pub fn attr(&self, name: &'static str) -> Option<Attr<'_>> {
        self.mark_used(name);
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| Attr::new(name, &attr.value))
    }

    /// Return true if the node has an attribute named `name`.
    pub fn has_attr(&self, name: &'static str) -> bool {
        self.attr(name).is_some()
    }

    /// Get an attribute and cast it to a given type.
    pub fn get_as<'a, T>(&'a self, name: &'static str) -> Option<T>
    where
        Attr<'a>: Into<T>,
    {
        self.attr(name).map(|v| v.into())
    }

    /// Get a required attribute.
    pub fn require_attr(&self, name: &'static str) -> Result<Attr<'_>, ConvertError> {
        self.attr(name).ok_or_else(|| {
            ConvertError::attr_error(self.name(), name, "required attribute missing")
        })
    }

    /// Return the names of attributes which have not been read since the node
    /// was created.
    pub fn unused_attrs(&self) -> Vec<&str> {
        let used = self.used_attrs.borrow();
        self.attrs
            .iter()
            .map(|attr| attr.name.as_str())
            .filter(|name| !used.iter().any(|used_name| used_name == name))
            .collect()
    }

    fn mark_used(&self, name: &'static str) {
        let mut used = self.used_attrs.borrow_mut();
        if !used.contains(&name) {
            used.push(name);
        }
    }
}

/// Wrapper around a node attribute value.
///
/// This provides methods to extract the value as a given type. Extracting a
/// value of a different type than the attribute holds produces a default,
/// as when reading an unset field of an ONNX `AttributeProto`.
#[derive(Copy, Clone, Debug)]
pub struct Attr<'a> {
    name: &'static str,
    value: &'a AttrValue,
}

impl<'a> Attr<'a> {
    fn new(name: &'static str, value: &'a AttrValue) -> Self {
        Self { name, value }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> &'a AttrValue {
        self.value
    }

    pub fn as_bool(&self) -> bool {
        self.as_i64() != 0
    }

    pub fn as_f32(&self) -> f32 {
        match self.value {
            AttrValue::Float(v) => *v,
            AttrValue::Int(v) => *v as f32,
            AttrValue::Floats(v) => v.first().copied().unwrap_or_default(),
            _ => 0.,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self.value {
            AttrValue::Int(v) => *v,
            _ => 0,
        }
    }

    pub fn as_ints(&self) -> &'a [i64] {
        match self.value {
            AttrValue::Ints(v) => v,
            AttrValue::Int(v) => std::slice::from_ref(v),
            _ => &[],
        }
    }

    pub fn as_floats(&self) -> &'a [f32] {
        match self.value {
            AttrValue::Floats(v) => v,
            AttrValue::Float(v) => std::slice::from_ref(v),
            _ => &[],
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self.value {
            AttrValue::String(v) => v,
            _ => "",
        }
    }

    pub fn as_strings(&self) -> &'a [String] {
        match self.value {
            AttrValue::Strings(v) => v,
            AttrValue::String(v) => std::slice::from_ref(v),
            _ => &[],
        }
    }

    pub fn as_tensor(&self) -> Option<&'a ConstantValue> {
        match self.value {
            AttrValue::Tensor(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_attr {
    ($into:ty, $as_fn:ident) => {
        impl<'a> From<Attr<'a>> for $into {
            fn from(val: Attr<'a>) -> Self {
                val.$as_fn()
            }
        }
    };
}

impl_from_attr!(f32, as_f32);
impl_from_attr!(i64, as_i64);
impl_from_attr!(&'a [i64], as_ints);
impl_from_attr!(&'a [f32], as_floats);
impl_from_attr!(bool, as_bool);
impl_from_attr!(&'a str, as_str);
