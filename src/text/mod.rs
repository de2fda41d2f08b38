use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::io::Read;
use crate::error::GraphError;

/// Layout of fixed-width reports. Labels map parameter names to the strings shown in
/// reports; formats map name fragments to the number of decimal places used for any
/// parameter whose name contains the fragment (the longest matching fragment wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {

    /// Column at which values of nested reports are right-aligned.
    pub line_width : usize,

    /// Indentation of each nesting level.
    pub indent : usize,

    /// Column at which values of parameter result strings start.
    pub whitespace : usize,

    pub labels : HashMap<String, String>,

    pub formats : HashMap<String, usize>,

    /// Decimal places for names without a matching format. If absent, such names are an error.
    pub default_precision : Option<usize>

}

impl Default for FormatterConfig {

    fn default() -> Self {
        Self {
            line_width : 90,
            indent : 4,
            whitespace : 40,
            labels : HashMap::new(),
            formats : HashMap::new(),
            default_precision : Some(4)
        }
    }

}

impl FormatterConfig {

    pub fn with_label(mut self, name : &str, label : &str) -> Self {
        self.labels.insert(name.to_string(), label.to_string());
        self
    }

    pub fn with_format(mut self, fragment : &str, decimals : usize) -> Self {
        self.formats.insert(fragment.to_string(), decimals);
        self
    }

    pub fn load<R>(reader : R) -> Result<Self, GraphError>
    where
        R : Read
    {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Decimal places for the informed parameter name.
    pub fn precision_for(&self, name : &str) -> Result<usize, GraphError> {
        self.formats.iter()
            .filter(|(k, _)| name.contains(&k[..]) )
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a) ) )
            .map(|(_, p)| *p )
            .or(self.default_precision)
            .ok_or_else(|| GraphError::MissingFormat(name.to_string()) )
    }

    pub fn label_for(&self, name : &str) -> Result<&str, GraphError> {
        self.labels.get(name)
            .map(|l| &l[..] )
            .ok_or_else(|| GraphError::MissingLabel(name.to_string()) )
    }

}

/// Pads the first string with spaces so the second starts at the informed column
/// (with no padding if the first string is already wider).
pub fn add_whitespace(first : &str, second : &str, column : usize) -> String {
    let n = column.saturating_sub(first.chars().count());
    format!("{}{}{}", first, " ".repeat(n), second)
}

/// Value followed by its interval limits and unit, e.g. 1.50 (1.20, 1.80) mm, with the
/// number of decimals configured for the parameter name.
pub fn value_with_limits_string(
    config : &FormatterConfig,
    name : &str,
    value : f64,
    limits : Option<(f64, f64)>,
    unit : Option<&str>
) -> Result<String, GraphError> {
    let p = config.precision_for(name)?;
    let mut s = format!("{:.*}", p, value);
    if let Some((lower, upper)) = limits {
        s += &format!(" ({:.*}, {:.*})", p, lower, p, upper)[..];
    }
    if let Some(unit) = unit {
        s += " ";
        s += unit;
    }
    Ok(s)
}

/// Single report line for a parameter: its name (or label, if name_to_label is set) with
/// an optional subscript, followed by the value string starting at the whitespace column.
pub fn parameter_result_string(
    config : &FormatterConfig,
    name : &str,
    value : f64,
    limits : Option<(f64, f64)>,
    subscript : Option<&str>,
    unit : Option<&str>,
    name_to_label : bool
) -> Result<String, GraphError> {
    let mut label = if name_to_label {
        config.label_for(name)?.to_string()
    } else {
        name.to_string()
    };
    if let Some(sub) = subscript {
        label += "_";
        label += sub;
    }
    let value = value_with_limits_string(config, name, value, limits, unit)?;
    Ok(add_whitespace(&label[..], &value[..], config.whitespace))
}

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    Branch(Vec<(String, Entry)>)
}

/// Nested key-value report. Entries are added by path and rendered in insertion order,
/// with values right-aligned at the configured line width and each nesting level indented:
///
/// ```
/// use graphfit::{FormatterConfig, TextFormatter};
/// let mut out = TextFormatter::new(FormatterConfig { line_width : 20, ..Default::default() });
/// out.add(&["gaussian", "centre"], "1.5");
/// out.add(&["sweeps"], 12);
/// assert_eq!(out.lines(), vec![
///     "gaussian".to_string(),
///     "    centre       1.5".to_string(),
///     "sweeps            12".to_string()
/// ]);
/// ```
#[derive(Debug, Clone)]
pub struct TextFormatter {

    config : FormatterConfig,

    entries : Vec<(String, Entry)>

}

impl TextFormatter {

    pub fn new(config : FormatterConfig) -> Self {
        Self { config, entries : Vec::new() }
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    /// Sets the value at the informed path, creating intermediate levels as needed. A
    /// value already at a path is replaced, and a value where a level is needed becomes
    /// that level. Empty paths are ignored.
    pub fn add<V>(&mut self, path : &[&str], value : V)
    where
        V : Display
    {
        insert(&mut self.entries, path, value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        render(&self.entries, self.config.line_width, self.config.indent, &mut lines);
        lines
    }

    pub fn text(&self) -> String {
        self.lines().join("\n")
    }

}

fn insert(entries : &mut Vec<(String, Entry)>, path : &[&str], value : String) {
    let (key, rest) = match path.split_first() {
        Some(split) => split,
        None => return
    };
    let pos = match entries.iter().position(|(k, _)| &k[..] == *key ) {
        Some(pos) => pos,
        None => {
            entries.push((key.to_string(), Entry::Branch(Vec::new())));
            entries.len() - 1
        }
    };
    let entry = &mut entries[pos].1;
    if rest.is_empty() {
        *entry = Entry::Value(value);
        return;
    }
    if let Entry::Value(_) = entry {
        *entry = Entry::Branch(Vec::new());
    }
    if let Entry::Branch(children) = entry {
        insert(children, rest, value);
    }
}

fn render(entries : &[(String, Entry)], width : usize, indent : usize, lines : &mut Vec<String>) {
    for (k, entry) in entries.iter() {
        match entry {
            Entry::Value(v) => {
                let n = width.saturating_sub(k.chars().count() + v.chars().count()).max(1);
                lines.push(format!("{}{}{}", k, " ".repeat(n), v));
            },
            Entry::Branch(children) => {
                lines.push(k.clone());
                let mut nested = Vec::new();
                render(children, width.saturating_sub(indent), indent, &mut nested);
                let pad = " ".repeat(indent);
                lines.extend(nested.into_iter().map(|l| format!("{}{}", pad, l) ));
            }
        }
    }
}
