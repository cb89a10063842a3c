//! Component namespacing.
//!
//! Components keep their bare names until a collision with an already
//! registered component would occur; colliding names are prefixed
//! `{plugin}:{component}`.

pub const NAMESPACE_SEP: char = ':';

/// Qualified name for a plugin component.
pub fn qualified(plugin: &str, component: &str) -> String {
    format!("{}{}{}", plugin, NAMESPACE_SEP, component)
}

/// Pick the registration name: bare when free, namespaced on collision.
pub fn resolve_name(plugin: &str, component: &str, taken: impl Fn(&str) -> bool) -> String {
    if taken(component) {
        qualified(plugin, component)
    } else {
        component.to_string()
    }
}

/// Split a possibly namespaced name into `(plugin, component)`.
pub fn split(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_when_free() {
        let name = resolve_name("pack", "review", |_| false);
        assert_eq!(name, "review");
    }

    #[test]
    fn test_namespaced_on_collision() {
        let name = resolve_name("pack", "review", |n| n == "review");
        assert_eq!(name, "pack:review");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("pack:review"), Some(("pack", "review")));
        assert_eq!(split("review"), None);
    }
}
