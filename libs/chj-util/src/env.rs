//! Reading on/off switches from environment variables.

use std::os::unix::prelude::OsStrExt;

/// Anything but the listed "off" spellings (including the empty
/// string) counts as on.
pub fn is_truthy(v: &[u8]) -> bool {
    match v {
        b"0" | b"" | b"off" | b"false" | b"no" => false,
        _ => true
    }
}

/// Whether the environment variable `name` is set to a truthy value;
/// unset means false.
pub fn env_truthy(name: &str) -> bool {
    match std::env::var_os(name) {
        Some(v) => is_truthy(v.as_bytes()),
        None => false
    }
}
