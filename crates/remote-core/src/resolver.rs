//! Symlink-name to host resolution

/// Map a symlink identity to the SSH host it targets.
///
/// Known aliases match by substring so `pi-mcpi`, `mcpi-dev` and plain
/// `mcpi` all reach the same host; anything else is taken literally.
pub fn resolve_host(identity: &str) -> &str {
    if identity.contains("mcpi") {
        "mcpi"
    } else if identity.contains("ftb") {
        "ftb"
    } else {
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_substrings() {
        assert_eq!(resolve_host("mcpi"), "mcpi");
        assert_eq!(resolve_host("pi-mcpi-dev"), "mcpi");
        assert_eq!(resolve_host("ftb"), "ftb");
        assert_eq!(resolve_host("my-ftb"), "ftb");
    }

    #[test]
    fn test_unknown_identity_passes_through() {
        assert_eq!(resolve_host("buildbox"), "buildbox");
        assert_eq!(resolve_host("foo"), "foo");
    }
}
