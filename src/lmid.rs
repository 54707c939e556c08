// File: src/lmid.rs
//! Language model identifiers of the form `type:class:name`.

use crate::error::{Result, WpError};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TYPE: &str = "lm";
pub const DEFAULT_CLASS: &str = "system";
pub const DEFAULT_NAME: &str = "en";

/// Model kinds; only language models exist so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Lm,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Lm => "lm",
        }
    }
}

/// Storage class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelClass {
    /// Read-only model shipped with the application.
    System,
    /// Persisted, user-writable, auto-learned model.
    User,
    /// In-memory scratch model, never persisted.
    Mem,
}

impl ModelClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelClass::System => "system",
            ModelClass::User => "user",
            ModelClass::Mem => "mem",
        }
    }
}

impl FromStr for ModelClass {
    type Err = WpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(ModelClass::System),
            "user" => Ok(ModelClass::User),
            "mem" => Ok(ModelClass::Mem),
            other => Err(WpError::InvalidLmid(format!("unknown model class '{other}'"))),
        }
    }
}

/// Fills in missing components of an id. Fields are aligned from the
/// right: `name`, `class:name`, `type:class:name`; empty fields take the
/// defaults. Idempotent.
pub fn canonicalize(lmid: &str) -> String {
    let fields: Vec<&str> = lmid.split(':').map(str::trim).collect();
    let n = fields.len();
    let field = |from_end: usize, default: &'static str| -> String {
        match n.checked_sub(from_end + 1).map(|i| fields[i]) {
            Some(f) if !f.is_empty() => f.to_string(),
            _ => default.to_string(),
        }
    };
    format!(
        "{}:{}:{}",
        field(2, DEFAULT_TYPE),
        field(1, DEFAULT_CLASS),
        field(0, DEFAULT_NAME)
    )
}

/// A validated, canonical model id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lmid {
    pub kind: ModelKind,
    pub class: ModelClass,
    pub name: String,
}

impl Lmid {
    pub fn parse(lmid: &str) -> Result<Self> {
        let canonical = canonicalize(lmid);
        let mut parts = canonical.splitn(3, ':');
        let (kind, class, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(c), Some(n)) => (k, c, n),
            _ => return Err(WpError::InvalidLmid(lmid.to_string())),
        };
        let kind = match kind {
            "lm" => ModelKind::Lm,
            other => return Err(WpError::InvalidLmid(format!("unknown model type '{other}'"))),
        };
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(WpError::InvalidLmid(format!("invalid model name '{name}'")));
        }
        Ok(Self { kind, class: class.parse()?, name: name.to_string() })
    }

    pub fn new(class: ModelClass, name: &str) -> Self {
        Self { kind: ModelKind::Lm, class, name: name.to_string() }
    }

    /// File name of the model inside its class directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.as_str())
    }
}

impl fmt::Display for Lmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.as_str(), self.class.as_str(), self.name)
    }
}

impl FromStr for Lmid {
    type Err = WpError;

    fn from_str(s: &str) -> Result<Self> {
        Lmid::parse(s)
    }
}

/// Splits `"<lmid>,<weight>"` descriptions into ids and weights. A missing
/// or unparsable weight is 1.0.
pub fn parse_lmdesc<S: AsRef<str>>(descriptions: &[S]) -> (Vec<String>, Vec<f64>) {
    descriptions
        .iter()
        .map(|desc| {
            let mut fields = desc.as_ref().splitn(2, ',');
            let lmid = fields.next().unwrap_or("").trim().to_string();
            let weight = fields.next().and_then(|w| w.trim().parse::<f64>().ok()).unwrap_or(1.0);
            (lmid, weight)
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults_from_the_right() {
        assert_eq!(canonicalize("en"), "lm:system:en");
        assert_eq!(canonicalize("user:en_US"), "lm:user:en_US");
        assert_eq!(canonicalize("lm:mem:scratch0"), "lm:mem:scratch0");
        assert_eq!(canonicalize(""), "lm:system:en");
        assert_eq!(canonicalize("::"), "lm:system:en");
        assert_eq!(canonicalize("user:"), "lm:user:en");
        assert_eq!(canonicalize("x:lm:user:de"), "lm:user:de");
    }

    #[test]
    fn parse_validates_components() {
        let id = Lmid::parse("user:en_US").expect("valid id");
        assert_eq!(id.class, ModelClass::User);
        assert_eq!(id.to_string(), "lm:user:en_US");
        assert_eq!(id.file_name(), "en_US.lm");
        assert!(matches!(Lmid::parse("lm:cloud:en"), Err(WpError::InvalidLmid(_))));
        assert!(matches!(Lmid::parse("dict:user:en"), Err(WpError::InvalidLmid(_))));
        assert!(Lmid::parse("user:../etc").is_err());
    }

    #[test]
    fn lmdesc_defaults_weight() {
        let (ids, weights) = parse_lmdesc(&["lm:system:en, 0.5", "lm:user:en", "mem:x,abc"]);
        assert_eq!(ids, vec!["lm:system:en", "lm:user:en", "mem:x"]);
        assert_eq!(weights, vec![0.5, 1.0, 1.0]);
    }
}
