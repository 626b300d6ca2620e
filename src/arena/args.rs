use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A single value of a game argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Int(i) => write!(f, "{i}"),
            ArgValue::Float(x) => write!(f, "{x}"),
            ArgValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

/// How the flags of a game binary are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPrefix {
    DoubleDash,
    SingleDash,
}

impl ArgPrefix {
    fn as_str(&self) -> &'static str {
        match self {
            ArgPrefix::DoubleDash => "--",
            ArgPrefix::SingleDash => "-",
        }
    }
}

/// Renders the key/value map of a game configuration into command line
/// arguments.
///
/// Booleans become bare flags, and only when true. Keys keep the order of
/// the map.
///
/// ```
/// use std::collections::BTreeMap;
/// use codeclash::arena::{ArgPrefix, ArgValue, GameArgs};
///
/// let mut args = BTreeMap::new();
/// args.insert("timeout".to_string(), ArgValue::Int(500));
/// args.insert("browser".to_string(), ArgValue::Bool(false));
/// args.insert("viewmap".to_string(), ArgValue::Bool(true));
///
/// let rendered = GameArgs::new(&args, ArgPrefix::DoubleDash).render();
/// assert_eq!(rendered, " --timeout 500 --viewmap");
/// ```
#[derive(Debug, Clone)]
pub struct GameArgs<'a> {
    args: &'a BTreeMap<String, ArgValue>,
    prefix: ArgPrefix,
}

impl<'a> GameArgs<'a> {
    pub fn new(args: &'a BTreeMap<String, ArgValue>, prefix: ArgPrefix) -> Self {
        GameArgs { args, prefix }
    }

    /// The rendered arguments, each preceded by a space so the result can be
    /// appended straight to a base command.
    pub fn render(&self) -> String {
        let prefix = self.prefix.as_str();
        let mut out = String::new();
        for (key, value) in self.args {
            match value {
                ArgValue::Bool(true) => out.push_str(&format!(" {prefix}{key}")),
                ArgValue::Bool(false) => {}
                other => out.push_str(&format!(" {prefix}{key} {other}")),
            }
        }
        out
    }

    /// `base` followed by the rendered arguments.
    pub fn append_to(&self, base: &str) -> String {
        format!("{base}{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_dash_prefix() {
        let mut args = BTreeMap::new();
        args.insert("r".to_string(), ArgValue::Int(100));
        args.insert("b".to_string(), ArgValue::Bool(true));
        let cmd = GameArgs::new(&args, ArgPrefix::SingleDash).append_to("./src/pmars");
        assert_eq!(cmd, "./src/pmars -b -r 100");
    }

    #[test]
    fn test_empty_args() {
        let args = BTreeMap::new();
        assert_eq!(
            GameArgs::new(&args, ArgPrefix::DoubleDash).append_to("./battlesnake play"),
            "./battlesnake play"
        );
    }

    #[test]
    fn test_untagged_values_deserialize() {
        let args: BTreeMap<String, ArgValue> =
            serde_json::from_str(r#"{"width": 11, "viewmap": true, "mode": "standard", "rate": 0.5}"#)
                .unwrap();
        assert_eq!(args["width"], ArgValue::Int(11));
        assert_eq!(args["viewmap"], ArgValue::Bool(true));
        assert_eq!(args["mode"], ArgValue::Str("standard".to_string()));
        assert_eq!(args["rate"], ArgValue::Float(0.5));
    }
}
