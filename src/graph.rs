//! ONNX graph representation used during conversion.

use rustc_hash::{FxHashMap, FxHashSet};

mod constant;
mod node;

pub use constant::ConstantValue;
pub use node::{Attr, AttrValue, Node};

/// Graph-level state shared by node converters.
///
/// This holds the statically known tensor shapes, plus a record of which
/// compile-time values have already been emitted into the network as
/// constant layers. A value is loaded at most once, even if several nodes
/// consume it.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    shapes: FxHashMap<String, Vec<usize>>,
    constants_loaded: FxHashSet<String>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Record the shape of a tensor, replacing any previous shape.
    pub fn set_shape(&mut self, name: &str, shape: &[usize]) {
        self.shapes.insert(name.to_string(), shape.to_vec());
    }

    /// Builder-style variant of [`set_shape`](Graph::set_shape).
    pub fn with_shape(mut self, name: &str, shape: &[usize]) -> Self {
        self.set_shape(name, shape);
        self
    }

    /// Return the shape of a tensor, if known.
    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.shapes.get(name).map(|s| s.as_slice())
    }

    /// Return the rank of a tensor, if its shape is known.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.shape(name).map(|s| s.len())
    }

    /// Return true if a constant layer has been emitted for `name`.
    pub fn is_constant_loaded(&self, name: &str) -> bool {
        self.constants_loaded.contains(name)
    }

    /// Record that `name` is available in the network as a constant.
    ///
    /// Returns false if it was already recorded.
    pub fn mark_constant_loaded(&mut self, name: &str) -> bool {
        self.constants_loaded.insert(name.to_string())
    }

    /// Iterate over the names of loaded constants, in arbitrary order.
    pub fn loaded_constants(&self) -> impl Iterator<Item = &str> {
        self.constants_loaded.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Graph;

    #[test]
    fn test_shapes() {
        let mut graph = Graph::new().with_shape("x", &[1, 3, 224, 224]);
        assert_eq!(graph.shape("x"), Some([1, 3, 224, 224].as_slice()));
        assert_eq!(graph.rank("x"), Some(4));
        assert_eq!(graph.shape("y"), None);

        graph.set_shape("x", &[2]);
        assert_eq!(graph.rank("x"), Some(1));
    }

    #[test]
    fn test_constants_loaded() {
        let mut graph = Graph::new();
        assert!(!graph.is_constant_loaded("w"));
        assert!(graph.mark_constant_loaded("w"));
        assert!(!graph.mark_constant_loaded("w"));
        assert!(graph.is_constant_loaded("w"));
        assert_eq!(graph.loaded_constants().collect::<Vec<_>>(), ["w"]);
    }
}
