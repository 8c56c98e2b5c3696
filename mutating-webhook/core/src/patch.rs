use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse {0} document: {1}")]
    Parse(&'static str, #[source] serde_json::Error),

    #[error("computed patch could not be applied: {0}")]
    Apply(#[from] json_patch::PatchError),

    #[error("computed patch does not reproduce the mutated document")]
    Mismatch,
}

/// Computes the JSON patch that transforms `before` into `after`.
///
/// Semantically identical documents produce an empty patch. Object members
/// set to `null` are treated as absent, since decoding and re-encoding a
/// resource drops them. The patch is checked by applying it to `before`
/// before it is returned.
pub fn diff(before: &[u8], after: &[u8]) -> Result<Patch, Error> {
    let original = parse("original", before)?;
    let mut after = parse("mutated", after)?;
    strip_nulls(&mut after);
    let mut before = original.clone();
    strip_nulls(&mut before);

    let patch = json_patch::diff(&before, &after);

    let mut doc = original;
    json_patch::patch(&mut doc, &patch.0)?;
    strip_nulls(&mut doc);
    if doc != after {
        return Err(Error::Mismatch);
    }

    Ok(patch)
}

fn parse(which: &'static str, raw: &[u8]) -> Result<Value, Error> {
    serde_json::from_slice(raw).map_err(|e| Error::Parse(which, e))
}

/// Removes `null` object members at any depth. Array elements keep their
/// positions, so `null` items are left alone.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
