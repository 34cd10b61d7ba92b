//! YAML presets and `key=value` overrides for [`EffectParameters`].

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::{Mapping, Value};

use crate::schema::EffectParameters;

pub fn load_and_validate_preset(path: &Path) -> Result<EffectParameters> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read preset {}", path.display()))?;
    let params = parse_preset(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;
    params
        .validate()
        .with_context(|| format!("invalid preset {}", path.display()))?;
    Ok(params)
}

/// An empty document yields the defaults.
fn parse_preset(contents: &str) -> Result<EffectParameters, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(EffectParameters::default());
    }
    serde_yaml::from_str(contents)
}

/// One `--set path.to.field=value` override.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOverride {
    pub path: Vec<String>,
    pub value: Value,
}

impl ParamOverride {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid --set '{}': expected 'key=value'", raw);
        };
        let key = key.trim();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            bail!("invalid --set '{}': empty parameter name", raw);
        }
        let value = value.trim();
        // '#rrggbb' would otherwise parse as a YAML comment
        let value = if value.starts_with('#') {
            Value::String(value.to_owned())
        } else {
            serde_yaml::from_str(value)
                .with_context(|| format!("invalid --set '{}': bad value", raw))?
        };
        Ok(Self {
            path: key.split('.').map(str::to_owned).collect(),
            value,
        })
    }

    pub fn key(&self) -> String {
        self.path.join(".")
    }
}

/// Applies overrides in order, then re-validates the whole parameter set.
/// Unknown keys are rejected.
pub fn apply_overrides(
    params: &EffectParameters,
    overrides: &[ParamOverride],
) -> Result<EffectParameters> {
    if overrides.is_empty() {
        return Ok(params.clone());
    }
    let mut tree = serde_yaml::to_value(params).context("failed to serialize parameters")?;
    for item in overrides {
        set_path(&mut tree, &item.path, item.value.clone())
            .with_context(|| format!("failed to apply --set {}", item.key()))?;
    }
    let params: EffectParameters =
        serde_yaml::from_value(tree).context("override produced invalid parameters")?;
    params.validate()?;
    Ok(params)
}

fn set_path(tree: &mut Value, path: &[String], value: Value) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        bail!("empty parameter path");
    };
    let Some(map) = tree.as_mapping_mut() else {
        bail!("'{}' is not a parameter group", head);
    };
    let key = Value::String(head.clone());
    let Some(slot) = map.get_mut(&key) else {
        bail!("unknown parameter '{}' (known: {})", head, known_keys(map));
    };
    if rest.is_empty() {
        if slot.is_mapping() {
            bail!("'{}' is a parameter group, set one of its fields", head);
        }
        *slot = value;
        return Ok(());
    }
    set_path(slot, rest, value).with_context(|| format!("in group '{}'", head))
}

fn known_keys(map: &Mapping) -> String {
    map.keys()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
