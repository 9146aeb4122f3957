//! Directive — a standing instruction prepended/appended to system prompts
//! during `reflect`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub id: String,
    pub bank_id: String,
    pub name: String,
    pub body: String,
    pub tags: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Split a set of active directives into the ones meant to precede and
/// follow the rest of a system prompt: a directive whose name starts with
/// `prefix:` (case-insensitive) goes first, everything else active goes
/// last, each group in the stable order it was passed in.
pub fn split_for_prompt(directives: &[Directive]) -> (Vec<&Directive>, Vec<&Directive>) {
    let active: Vec<&Directive> = directives.iter().filter(|d| d.active).collect();
    let mut prepend = Vec::new();
    let mut append = Vec::new();
    for d in active {
        if d.name.to_lowercase().starts_with("prefix:") {
            prepend.push(d);
        } else {
            append.push(d);
        }
    }
    (prepend, append)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, active: bool) -> Directive {
        let now = Utc::now();
        Directive {
            id: format!("d-{name}"),
            bank_id: "b1".into(),
            name: name.into(),
            body: "be concise".into(),
            tags: vec![],
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn inactive_directives_excluded_from_prompt() {
        let directives = vec![sample("greeting", true), sample("retired", false)];
        let (_, append) = split_for_prompt(&directives);
        assert_eq!(append.len(), 1);
        assert_eq!(append[0].name, "greeting");
    }

    #[test]
    fn prefix_directives_go_first() {
        let directives = vec![sample("closing", true), sample("Prefix: tone", true)];
        let (prepend, append) = split_for_prompt(&directives);
        assert_eq!(prepend.len(), 1);
        assert_eq!(append.len(), 1);
    }
}
