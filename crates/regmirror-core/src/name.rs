use crate::MirrorError;

const MAX_NAME_LEN: usize = 214;

/// Rejects names that could escape the mirror root or collide on disk.
pub fn validate_package_name(name: &str) -> Result<(), MirrorError> {
    let invalid = |reason: &str| {
        Err(MirrorError::InvalidPackageName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("longer than 214 bytes");
    }
    if name.chars().any(|ch| ch.is_whitespace() || ch == '\\' || ch.is_control()) {
        return invalid("contains whitespace, control characters or backslashes");
    }

    let segments: Vec<&str> = name.split('/').collect();
    match segments.as_slice() {
        [single] => {
            if single.starts_with('@') {
                return invalid("scope without package name");
            }
        }
        [scope, _] => {
            if !scope.starts_with('@') || scope.len() < 2 {
                return invalid("only scoped names may contain '/'");
            }
        }
        _ => return invalid("too many '/' separators"),
    }

    for segment in &segments {
        let bare = segment.trim_start_matches('@');
        if bare.is_empty() || bare == "." || bare == ".." || segment.starts_with('.') {
            return invalid("empty or relative path segment");
        }
    }

    Ok(())
}

/// The unscoped part of a package name, used for tarball file names.
pub fn tarball_basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
