use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

const ELLIPSIS: &str = "...";
const FALLBACK_FILENAME: &str = "document";

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid built-in pattern"))
}

fn unsafe_chars() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#"[<>:"/\\|?*]"#)
}

fn separator_runs() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"[\s_]+")
}

fn placeholders() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"\{[^}]*\}")
}

fn underscore_runs() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"_+")
}

fn iso_date_shape() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"^\d{4}-\d{2}-\d{2}$")
}

/// `My File: Test / 2024` becomes `My_File_Test_2024`.
pub fn clean_filename(raw: &str) -> String {
    let replaced = unsafe_chars().replace_all(raw, "_");
    let collapsed = separator_runs().replace_all(&replaced, "_");
    collapsed
        .trim_matches(|c: char| c == '_' || c == ' ')
        .to_string()
}

/// Drops filesystem-unsafe characters from a title while keeping its spaces.
pub fn strip_unsafe_chars(raw: &str) -> String {
    let replaced = unsafe_chars().replace_all(raw, " ");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Caps `title` at `max_chars` characters, ending in `...` when cut.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return title.chars().take(max_chars).collect();
    }
    let mut truncated: String = title.chars().take(max_chars - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Accepts only real calendar dates written as `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !iso_date_shape().is_match(trimmed) {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

#[derive(Debug, Clone, Default)]
pub struct NamingVariables<'a> {
    pub date: Option<&'a str>,
    pub document_type: Option<&'a str>,
    pub correspondent: Option<&'a str>,
    pub title: Option<&'a str>,
    pub original: Option<&'a str>,
}

impl<'a> NamingVariables<'a> {
    fn pairs(&self) -> [(&'static str, Option<&'a str>); 5] {
        [
            ("date", self.date),
            ("type", self.document_type),
            ("correspondent", self.correspondent),
            ("title", self.title),
            ("original", self.original),
        ]
    }
}

pub fn apply_template(template: &str, variables: &NamingVariables<'_>, clean: bool) -> String {
    let mut result = template.to_string();
    for (key, value) in variables.pairs() {
        let value = value
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                if clean {
                    clean_filename(value)
                } else {
                    value.to_string()
                }
            })
            .unwrap_or_default();
        result = result.replace(&format!("{{{key}}}"), &value);
    }

    let result = placeholders().replace_all(&result, "");
    let result = underscore_runs().replace_all(&result, "_");
    let mut result = result.trim_matches('_').to_string();
    if clean {
        result = clean_filename(&result);
    }

    if result.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        result
    }
}
