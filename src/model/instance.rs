use nalgebra::*;
use crate::error::GraphError;

/// A model with a value substituted for each of its parameters; This is what
/// likelihood functions receive. Leaves hold vectors (with a single entry for
/// scalar parameters and constants); branches mirror the tree the instance was
/// built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {

    Value(DVector<f64>),

    Branch(Vec<(String, Instance)>)

}

impl Instance {

    /// Immediate child with the informed name.
    pub fn get(&self, name : &str) -> Option<&Instance> {
        match self {
            Instance::Branch(items) => items.iter().find(|(k, _)| &k[..] == name ).map(|(_, i)| i ),
            Instance::Value(_) => None
        }
    }

    /// Follows a sequence of names from this node.
    pub fn at(&self, path : &[&str]) -> Option<&Instance> {
        path.iter().fold(Some(self), |node, name| node.and_then(|n| n.get(name) ) )
    }

    /// Leaf value, if this node is a leaf.
    pub fn value(&self) -> Option<&DVector<f64>> {
        match self {
            Instance::Value(v) => Some(v),
            Instance::Branch(_) => None
        }
    }

    /// Value of the named child leaf.
    pub fn vector(&self, name : &str) -> Result<&DVector<f64>, GraphError> {
        self.get(name)
            .and_then(|i| i.value() )
            .ok_or_else(|| GraphError::UnknownVariable { variable : name.to_string() })
    }

    /// Value of the named child leaf, which must hold a single element.
    pub fn scalar(&self, name : &str) -> Result<f64, GraphError> {
        let v = self.vector(name)?;
        if v.nrows() != 1 {
            return Err(GraphError::Dimension { variable : name.to_string(), expected : 1, found : v.nrows() });
        }
        Ok(v[0])
    }

    pub fn keys(&self) -> Vec<&str> {
        match self {
            Instance::Branch(items) => items.iter().map(|(k, _)| &k[..] ).collect(),
            Instance::Value(_) => Vec::new()
        }
    }

}

#[test]
fn nested_access() {
    let inst = Instance::Branch(vec![
        (String::from("gaussian"), Instance::Branch(vec![
            (String::from("centre"), Instance::Value(DVector::from_element(1, 2.0))),
            (String::from("weights"), Instance::Value(DVector::from_vec(vec![1.0, 2.0])))
        ]))
    ]);
    let g = inst.get("gaussian").unwrap();
    assert_eq!(g.scalar("centre").unwrap(), 2.0);
    assert!(g.scalar("weights").is_err());
    assert_eq!(g.vector("weights").unwrap().nrows(), 2);
    assert!(inst.at(&["gaussian", "centre"]).is_some());
    assert!(inst.at(&["gaussian", "missing"]).is_none());
    assert_eq!(g.keys(), vec!["centre", "weights"]);
}
