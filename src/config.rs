//! Optional TOML project file. Command line options are applied after it.
//!
//! ```toml
//! target = "6809"
//! format = "decb"
//! pragmas = ["cescapes", "nodollarlocal"]
//! include = ["lib"]
//!
//! [defines]
//! DEBUG = "1"
//! SCREEN = "$0400"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{de, Deserializer};
use serde_derive::Deserialize;

use crate::asm::{Asm, OutputFormat, Target};
use crate::error::AsmError;
use crate::parse_number;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub target: Option<Target>,
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub pragmas: Vec<String>,
    #[serde(default)]
    pub include: Vec<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_defines")]
    pub defines: IndexMap<String, i32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefineValue {
    Int(i64),
    Str(String),
}

fn deserialize_defines<'de, D>(deserializer: D) -> Result<IndexMap<String, i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, DefineValue> = serde::Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, value)| {
            let value = match value {
                DefineValue::Int(value) => value as i32,
                DefineValue::Str(text) => parse_number(&text).ok_or_else(|| {
                    <D::Error as de::Error>::custom(format!("invalid value for {name}: {text}"))
                })?,
            };
            Ok((name, value))
        })
        .collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AsmError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AsmError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| AsmError::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply(&self, asm: &mut Asm) -> Result<(), AsmError> {
        if let Some(target) = self.target {
            asm.target = target;
        }
        if let Some(format) = self.format {
            asm.set_format(format);
        }
        for list in &self.pragmas {
            asm.pragmas.apply(list)?;
        }
        for path in &self.include {
            asm.input.add_include_path(path);
        }
        for (name, value) in &self.defines {
            asm.define(name, *value);
        }
        Ok(())
    }
}
