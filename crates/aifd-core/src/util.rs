//! Small helpers shared across the engine.

/// Semver-ish comparison: returns true when `new_v` is greater than
/// `current_best` (or when there is no current best). Falls back to string
/// comparison for non-numeric components.
pub fn is_version_better(new_v: &str, current_best: Option<&str>) -> bool {
    let Some(best) = current_best else {
        return true;
    };

    let new_parts: Vec<&str> = new_v.split('.').collect();
    let best_parts: Vec<&str> = best.split('.').collect();

    for i in 0..new_parts.len().max(best_parts.len()) {
        let n = new_parts.get(i).and_then(|s| s.parse::<u64>().ok());
        let b = best_parts.get(i).and_then(|s| s.parse::<u64>().ok());

        match (n, b) {
            (Some(nv), Some(bv)) if nv != bv => return nv > bv,
            (Some(_), None) => return true,
            (None, Some(_)) => return false,
            _ => {
                let ns = new_parts.get(i).copied().unwrap_or("");
                let bs = best_parts.get(i).copied().unwrap_or("");
                if ns != bs {
                    return ns > bs;
                }
            },
        }
    }

    false
}

/// Largest index `<= idx` that is a UTF-8 char boundary in `s`.
pub fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Split a `<name>@<version>` directory name. Scoped npm names keep their
/// leading `@`: `@types/node@20.1.0` splits at the last separator.
pub fn split_name_version(dir_name: &str) -> Option<(&str, &str)> {
    let (name, version) = dir_name.rsplit_once('@')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}
