use serde_json::{self, Value, map::Map};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use crate::graph::Variable;
use crate::prior::Prior;
use crate::error::GraphError;
use super::ModelTree;

/// Model trees are read from JSON documents where objects are branches, numbers are constants
/// and objects carrying a "type" field are parameters (with the prior fields, an optional
/// "dim" for array-valued parameters, and an optional "share" key). Parameters declaring the
/// same share key become the same variable, which is how a JSON document expresses a quantity
/// common to several sub-models:
///
/// ```json
/// {
///     "gaussian" : {
///         "centre" : { "type" : "Gaussian", "mean" : 50.0, "sigma" : 10.0, "share" : "centre" },
///         "sigma" : 5.0
///     },
///     "exponential" : {
///         "centre" : { "type" : "Gaussian", "mean" : 50.0, "sigma" : 10.0, "share" : "centre" },
///         "rate" : { "type" : "LogUniform", "lower" : 0.01, "upper" : 10.0 }
///     }
/// }
/// ```
///
/// Arrays are read as branches with numbered names.
impl ModelTree {

    pub fn load_from_path<P>(path : P) -> Result<Self, GraphError>
    where
        P : AsRef<Path>
    {
        let f = File::open(path)?;
        Self::load(f)
    }

    pub fn load<R>(mut reader : R) -> Result<Self, GraphError>
    where
        R : Read
    {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        let val : Value = serde_json::from_str(&content[..])?;
        Self::from_json(&val)
    }

    pub fn from_json(val : &Value) -> Result<Self, GraphError> {
        let mut shared = HashMap::new();
        parse_node("root", val, &mut shared)
    }

    /// JSON representation of this tree. Variables occupying more than one position
    /// receive a share key built from their identity.
    pub fn to_json(&self) -> Value {
        let mut counts : HashMap<usize, usize> = HashMap::new();
        for (_, v) in self.parameters() {
            *counts.entry(v.id()).or_insert(0) += 1;
        }
        node_to_value(self, &counts)
    }

    pub fn save_to_path<P>(&self, path : P) -> Result<(), GraphError>
    where
        P : AsRef<Path>
    {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        self.save(file)
    }

    pub fn save<W>(&self, mut writer : W) -> Result<(), GraphError>
    where
        W : Write
    {
        let content = serde_json::to_string_pretty(&self.to_json())?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

}

impl FromStr for ModelTree {

    type Err = GraphError;

    fn from_str(s : &str) -> Result<Self, GraphError> {
        let val : Value = serde_json::from_str(s)?;
        Self::from_json(&val)
    }

}

fn parse_node(name : &str, val : &Value, shared : &mut HashMap<String, Variable>) -> Result<ModelTree, GraphError> {
    match val {
        Value::Number(n) => {
            let c = n.as_f64().ok_or_else(|| GraphError::Parse(format!("Invalid constant at {}", name)) )?;
            Ok(ModelTree::Constant(c))
        },
        Value::Object(map) if map.contains_key("type") => parse_parameter(name, val, map, shared),
        Value::Object(map) => {
            let mut items = Vec::with_capacity(map.len());
            for (k, v) in map.iter() {
                items.push((k.clone(), parse_node(&k[..], v, shared)?));
            }
            Ok(ModelTree::Branch(items))
        },
        Value::Array(vals) => {
            let mut items = Vec::with_capacity(vals.len());
            for (i, v) in vals.iter().enumerate() {
                let k = i.to_string();
                let node = parse_node(&k[..], v, shared)?;
                items.push((k, node));
            }
            Ok(ModelTree::Branch(items))
        },
        _ => Err(GraphError::Parse(format!("Entry {} should be a number, object or array", name)))
    }
}

fn parse_parameter(
    name : &str,
    val : &Value,
    map : &Map<String, Value>,
    shared : &mut HashMap<String, Variable>
) -> Result<ModelTree, GraphError> {
    let prior : Prior = serde_json::from_value(val.clone())?;
    prior.validate()?;
    let dim = match map.get("dim") {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(d) if d > 0 => d as usize,
            _ => return Err(GraphError::Parse(format!("Entry 'dim' of {} should be a positive integer", name)))
        },
        Some(_) => return Err(GraphError::Parse(format!("Entry 'dim' of {} should be a positive integer", name))),
        None => 1
    };
    match map.get("share") {
        Some(Value::String(key)) => {
            if let Some(v) = shared.get(key) {
                if *v.prior() != prior || v.dim() != dim {
                    return Err(GraphError::Parse(format!(
                        "Parameter {} shares key '{}' but declares a different prior or dimension",
                        name,
                        key
                    )));
                }
                return Ok(ModelTree::Parameter(v.clone()));
            }
            let v = Variable::with_dim(name, prior, dim)?;
            shared.insert(key.clone(), v.clone());
            Ok(ModelTree::Parameter(v))
        },
        Some(_) => Err(GraphError::Parse(format!("Entry 'share' of {} should be a string", name))),
        None => Ok(ModelTree::Parameter(Variable::with_dim(name, prior, dim)?))
    }
}

fn node_to_value(node : &ModelTree, counts : &HashMap<usize, usize>) -> Value {
    match node {
        ModelTree::Constant(c) => Value::from(*c),
        ModelTree::Parameter(v) => {
            let mut val = serde_json::to_value(v.prior()).unwrap_or(Value::Null);
            if let Value::Object(ref mut map) = val {
                if v.dim() > 1 {
                    map.insert(String::from("dim"), Value::from(v.dim()));
                }
                if counts.get(&v.id()).cloned().unwrap_or(0) > 1 {
                    map.insert(String::from("share"), Value::from(v.label()));
                }
            }
            val
        },
        ModelTree::Branch(items) => {
            let mut map = Map::new();
            for (k, n) in items.iter() {
                map.insert(k.clone(), node_to_value(n, counts));
            }
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    const PROFILES : &str = r#"{
        "gaussian" : {
            "centre" : { "type" : "Gaussian", "mean" : 50.0, "sigma" : 10.0, "share" : "centre" },
            "sigma" : 5.0
        },
        "exponential" : {
            "centre" : { "type" : "Gaussian", "mean" : 50.0, "sigma" : 10.0, "share" : "centre" },
            "rate" : { "type" : "LogUniform", "lower" : 0.01, "upper" : 10.0 },
            "weights" : { "type" : "Uniform", "lower" : 0.0, "upper" : 1.0, "dim" : 3 }
        }
    }"#;

    #[test]
    fn shared_keys_become_one_variable() {
        let tree : ModelTree = PROFILES.parse().unwrap();
        assert_eq!(tree.parameters().len(), 4);
        assert_eq!(tree.prior_count(), 3);
        let g = tree.get("gaussian").unwrap().get("centre").unwrap();
        let e = tree.get("exponential").unwrap().get("centre").unwrap();
        match (g, e) {
            (ModelTree::Parameter(a), ModelTree::Parameter(b)) => assert_eq!(a, b),
            _ => panic!("Expected parameters")
        }
        let weights = tree.priors().into_iter().find(|v| v.name() == "weights" ).unwrap();
        assert_eq!(weights.dim(), 3);
    }

    #[test]
    fn conflicting_share_is_rejected() {
        let doc = r#"{
            "a" : { "type" : "Gaussian", "mean" : 0.0, "sigma" : 1.0, "share" : "x" },
            "b" : { "type" : "Gaussian", "mean" : 1.0, "sigma" : 1.0, "share" : "x" }
        }"#;
        assert!(matches!(doc.parse::<ModelTree>(), Err(GraphError::Parse(_))));
        assert!(r#"{ "a" : "text" }"#.parse::<ModelTree>().is_err());
        assert!(r#"{ "a" : { "type" : "Gaussian", "mean" : 0.0, "sigma" : -1.0 } }"#.parse::<ModelTree>().is_err());
    }

    #[test]
    fn branches_keep_document_order() {
        let doc = r#"{
            "zeta" : { "type" : "Gaussian", "mean" : 0.0, "sigma" : 1.0 },
            "alpha" : 2.0,
            "mid" : { "type" : "Uniform", "lower" : 0.0, "upper" : 1.0 }
        }"#;
        let tree : ModelTree = doc.parse().unwrap();
        let names : Vec<String> = tree.parameters().into_iter().map(|(path, _)| path.join("_") ).collect();
        assert_eq!(names, vec!["zeta".to_string(), "mid".to_string()]);
        match &tree {
            ModelTree::Branch(items) => assert_eq!(items[1].0, "alpha"),
            _ => panic!("Expected a branch")
        }

        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();
        let reloaded = ModelTree::load(&buf[..]).unwrap();
        assert_eq!(reloaded.parameters()[0].0[0], "zeta");
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let tree : ModelTree = PROFILES.parse().unwrap();
        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();
        let reloaded = ModelTree::load(&buf[..]).unwrap();
        assert_eq!(reloaded.parameters().len(), 4);
        assert_eq!(reloaded.prior_count(), 3);
    }

}
