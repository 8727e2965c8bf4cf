//! Explanation text rendered from the violator set
//!
//! Every condition shares one format: the distinct violator names in
//! insertion order, wrapped in braces, followed by the condition's phrase.
//! Anonymous subjects all render as the single word "learner".

use crate::subject::Subject;

/// Render the explanation for the current violators.
///
/// Returns `None` when nobody is violating.
pub fn render<'a>(violators: impl IntoIterator<Item = &'a Subject>, phrase: &str) -> Option<String> {
    let mut names: Vec<&str> = Vec::new();
    for subject in violators {
        let name = subject.display_name();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        return None;
    }

    Some(format!("{{{}}} {}", names.join(", "), phrase))
}
