//! Engine API version negotiation.

use std::cmp::Ordering;

use berth_common::constants::{MAX_API_VERSION, MIN_API_VERSION};
use berth_common::error::EngineError;

/// Parses `major.minor` into a comparable pair.
fn parse(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Orders two `major.minor` versions; unparsable versions sort lowest.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    parse(a).cmp(&parse(b))
}

/// Picks the API version to speak: the lower of the server's version and
/// [`MAX_API_VERSION`].
///
/// # Errors
///
/// Returns `EngineError::Unsupported` if the server version is malformed or
/// older than [`MIN_API_VERSION`].
pub fn negotiate(server: &str) -> Result<String, EngineError> {
    if parse(server).is_none() {
        return Err(EngineError::Unsupported(format!(
            "engine reported malformed API version {server:?}"
        )));
    }
    if compare(server, MIN_API_VERSION) == Ordering::Less {
        return Err(EngineError::Unsupported(format!(
            "engine API {server} is older than the minimum {MIN_API_VERSION}"
        )));
    }
    let chosen = match compare(server, MAX_API_VERSION) {
        Ordering::Less => server.trim(),
        _ => MAX_API_VERSION,
    };
    Ok(chosen.to_string())
}
