use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::value::Value;

/// SHA-256 over the canonical JSON of `(path, values)` pairs, in axis order.
///
/// Stored next to the exploration so a resumed sweep can prove it binds the
/// same values to the same run indices.
pub fn exploration_fingerprint<'a, I>(axes: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [Value])>,
{
    let mut hasher = Sha256::new();
    for (path, values) in axes {
        hasher.update(stable_json((path, values)));
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub fn stable_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of exploration values should not fail")
}
