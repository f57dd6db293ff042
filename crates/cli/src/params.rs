//! Workflow parameter handling for `cfy qp`.

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde_json::{Map, Value};

/// Upper bound (exclusive) for generated sampler seeds.
pub const MAX_SEED: u64 = 999_999_999_999_999;

/// Parse the `--data` argument into a value map.
///
/// The argument must be a JSON object; an empty string is treated as `{}`.
pub fn parse_values(data: &str) -> Result<Map<String, Value>> {
    if data.trim().is_empty() {
        return Ok(Map::new());
    }
    let parsed: Value = serde_json::from_str(data).context("data is not valid JSON")?;
    match parsed {
        Value::Object(map) => Ok(map),
        other => bail!("data must be a JSON object, got {other}"),
    }
}

/// `seed` unchanged, or a random seed when it is 0.
pub fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    rand::rng().random_range(1..MAX_SEED)
}

/// Build the template values: `--data` plus the resolved `seed`.
pub fn template_values(data: &str, seed: u64) -> Result<(Map<String, Value>, u64)> {
    let mut values = parse_values(data)?;
    let seed = resolve_seed(seed);
    values.insert("seed".to_string(), Value::from(seed));
    Ok((values, seed))
}
