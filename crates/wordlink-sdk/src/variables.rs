// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Symbolic names for the controller's `$WORD` registers.
//!
//! The index is loaded once from a descriptor in `NAME value` form (the
//! controller's `#define NAME value` header is accepted as is) and is
//! read-only afterwards. Category and allowed values come from a built-in
//! catalogue of known registers; unknown names are `System` and accept any
//! value.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{Result, SdkError};

/// Descriptor shipped with the crate.
const BUILTIN_DESCRIPTOR: &str = include_str!("../descriptors/words_idx.h");

/// Register category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    Control,
    Command,
    State,
    Parameter,
    Io,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Control => "control",
            Category::Command => "command",
            Category::State => "state",
            Category::Parameter => "parameter",
            Category::Io => "io",
        }
    }
}

/// Values a register accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedValues {
    Any,
    OneOf(Vec<i64>),
    Range { min: i64, max: i64 },
}

impl AllowedValues {
    fn accepts(&self, value: i64) -> bool {
        match self {
            AllowedValues::Any => true,
            AllowedValues::OneOf(values) => values.contains(&value),
            AllowedValues::Range { min, max } => (*min..=*max).contains(&value),
        }
    }
}

impl fmt::Display for AllowedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedValues::Any => write!(f, "any"),
            AllowedValues::OneOf(values) => {
                let list: Vec<String> = values.iter().map(i64::to_string).collect();
                write!(f, "one of [{}]", list.join(", "))
            }
            AllowedValues::Range { min, max } => write!(f, "{}..={}", min, max),
        }
    }
}

/// One named register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub address: u32,
    pub category: Category,
    pub description: String,
    pub allowed: AllowedValues,
}

impl VariableDescriptor {
    /// Check `value` against the allowed set.
    pub fn validate(&self, value: &str) -> Result<()> {
        if self.allowed == AllowedValues::Any {
            return Ok(());
        }
        let invalid = |reason: String| SdkError::InvalidValue {
            name: self.name.clone(),
            value: value.to_string(),
            reason,
        };
        let parsed: i64 = value
            .trim()
            .parse()
            .map_err(|_| invalid("not an integer".to_string()))?;
        if !self.allowed.accepts(parsed) {
            return Err(invalid(format!("expected {}", self.allowed)));
        }
        Ok(())
    }

    /// Console assignment, e.g. `$WORD[4]:=1`.
    pub fn command_string(&self, value: &str) -> String {
        format!("$WORD[{}]:={}", self.address, value)
    }
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$WORD[{}]", self.address)
    }
}

struct CatalogueEntry {
    name: &'static str,
    category: Category,
    description: &'static str,
    allowed: fn() -> AllowedValues,
}

fn any() -> AllowedValues {
    AllowedValues::Any
}

fn trigger() -> AllowedValues {
    AllowedValues::OneOf(vec![1])
}

fn state_range() -> AllowedValues {
    AllowedValues::Range { min: 0, max: 99 }
}

fn binary() -> AllowedValues {
    AllowedValues::OneOf(vec![0, 1])
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        name: "ID_COM",
        category: Category::Control,
        description: "correlation register echoed in replies",
        allowed: any,
    },
    CatalogueEntry {
        name: "SAY_HELLO",
        category: Category::Command,
        description: "greeting command",
        allowed: trigger,
    },
    CatalogueEntry {
        name: "MAQUINA_ESTADOS",
        category: Category::State,
        description: "state machine selector",
        allowed: state_range,
    },
    CatalogueEntry {
        name: "MOVE_TO_HOME",
        category: Category::Command,
        description: "move the arm to its home position",
        allowed: trigger,
    },
    CatalogueEntry {
        name: "dX",
        category: Category::Parameter,
        description: "X offset",
        allowed: any,
    },
    CatalogueEntry {
        name: "dY",
        category: Category::Parameter,
        description: "Y offset",
        allowed: any,
    },
    CatalogueEntry {
        name: "dZ",
        category: Category::Parameter,
        description: "Z offset",
        allowed: any,
    },
    CatalogueEntry {
        name: "dA",
        category: Category::Parameter,
        description: "A angle",
        allowed: any,
    },
    CatalogueEntry {
        name: "dE",
        category: Category::Parameter,
        description: "E angle",
        allowed: any,
    },
    CatalogueEntry {
        name: "dR",
        category: Category::Parameter,
        description: "R angle",
        allowed: any,
    },
    CatalogueEntry {
        name: "CANTIDAD_MUESCAS",
        category: Category::Parameter,
        description: "number of notches",
        allowed: any,
    },
    CatalogueEntry {
        name: "MUESCAS_MATRIX_XY",
        category: Category::Parameter,
        description: "first word of the notch X,Y pairs",
        allowed: any,
    },
    CatalogueEntry {
        name: "DELAY_TROQUELADORA",
        category: Category::Parameter,
        description: "die press delay in milliseconds",
        allowed: any,
    },
    CatalogueEntry {
        name: "EV_PINZA",
        category: Category::Io,
        description: "gripper valve output",
        allowed: binary,
    },
];

fn describe(name: &str, address: u32) -> VariableDescriptor {
    match CATALOGUE.iter().find(|entry| entry.name == name) {
        Some(entry) => VariableDescriptor {
            name: name.to_string(),
            address,
            category: entry.category,
            description: entry.description.to_string(),
            allowed: (entry.allowed)(),
        },
        None => VariableDescriptor {
            name: name.to_string(),
            address,
            category: Category::System,
            description: String::new(),
            allowed: AllowedValues::Any,
        },
    }
}

/// Read-only name to register map.
#[derive(Debug, Clone, Default)]
pub struct VariableIndex {
    variables: Vec<VariableDescriptor>,
    by_name: HashMap<String, usize>,
}

impl VariableIndex {
    /// Parse descriptor text. Lines that are not `NAME value` or
    /// `#define NAME value` are ignored; later duplicates win.
    pub fn parse(source: &str) -> Self {
        let mut index = Self::default();
        for line in source.lines() {
            if let Some((name, address)) = parse_line(line) {
                index.insert(name, address);
            }
        }
        index
    }

    /// Load a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SdkError::Descriptor {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::parse(&source);
        info!(path = %path.display(), variables = index.len(), "loaded variable descriptor");
        Ok(index)
    }

    /// The descriptor shipped with the crate.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_DESCRIPTOR)
    }

    /// The configured descriptor file, or the built-in one.
    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        match &config.descriptor_path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    fn insert(&mut self, name: &str, address: u32) {
        match self.by_name.get(name) {
            Some(&slot) => self.variables[slot].address = address,
            None => {
                self.by_name.insert(name.to_string(), self.variables.len());
                self.variables.push(describe(name, address));
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&VariableDescriptor> {
        self.get(name)
            .ok_or_else(|| SdkError::UnknownVariable(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&VariableDescriptor> {
        self.by_name.get(name).map(|&slot| &self.variables[slot])
    }

    /// Address of `name`, or `default` when the descriptor does not define it.
    ///
    /// Firmware and software are versioned independently, so a missing name
    /// is not an error.
    pub fn lookup_or_default(&self, name: &str, default: u32) -> u32 {
        match self.get(name) {
            Some(variable) => variable.address,
            None => {
                debug!(name, default, "variable not in descriptor, using default address");
                default
            }
        }
    }

    /// Validate `value` for `name`.
    pub fn validate(&self, name: &str, value: &str) -> Result<()> {
        self.resolve(name)?.validate(value)
    }

    /// Validated console assignment for `name`.
    pub fn command_string(&self, name: &str, value: &str) -> Result<String> {
        let variable = self.resolve(name)?;
        variable.validate(value)?;
        Ok(variable.command_string(value))
    }

    pub fn by_address(&self, address: u32) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|v| v.address == address)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &VariableDescriptor> {
        self.variables.iter().filter(move |v| v.category == category)
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(&str, u32)> {
    let line = line.split("//").next().unwrap_or_default();
    let mut tokens = line.split_whitespace();
    let mut name = tokens.next()?;
    if name == "#define" {
        name = tokens.next()?;
    }
    let value = tokens.next()?;
    if tokens.next().is_some() || !is_identifier(name) {
        return None;
    }
    value.parse().ok().map(|address| (name, address))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
