//! Closest-name suggestions for an unrecognized command.

use xkit_core::ids::CommandName;

/// Return up to `limit` of `known`, ordered by ascending edit distance to
/// `requested`.
#[must_use]
pub fn closest(requested: &str, known: &[CommandName], limit: usize) -> Vec<CommandName> {
    let mut scored: Vec<(usize, &CommandName)> = known
        .iter()
        .map(|name| (edit_distance::edit_distance(requested, name.as_str()), name))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
    scored.into_iter().take(limit).map(|(_, name)| name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<CommandName> {
        values.iter().map(|v| CommandName::new(*v).unwrap()).collect()
    }

    #[test]
    fn returns_the_three_closest_names() {
        let known = names(&["status", "stash", "start", "commit", "push"]);
        let suggestions = closest("stat", &known, 3);
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].as_str(), "status");
    }

    #[test]
    fn caps_at_the_requested_limit() {
        let known = names(&["a", "b", "c", "d"]);
        assert_eq!(closest("x", &known, 2).len(), 2);
    }

    #[test]
    fn empty_catalog_yields_no_suggestions() {
        assert!(closest("anything", &[], 3).is_empty());
    }
}
