//! Extraction of `[practice name]: justification` findings from generated text.
//!
//! Lines that do not have that shape are ignored; an input with no matches yields an
//! empty list, which callers treat as "nothing applied".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// The justification stops at the end of the line; `[ \t]*` keeps an empty justification
// from swallowing the next line.
static FINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.*?)\]:[ \t]*(.*)").expect("finding pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Bracketed text, verbatim
    pub practice_name: String,
    pub justification: String,
}

/// Scan `text` for findings in match order.
pub fn parse_findings(text: &str) -> Vec<Finding> {
    FINDING_RE
        .captures_iter(text)
        .map(|caps| Finding {
            practice_name: caps[1].to_string(),
            justification: caps[2].trim_end().to_string(),
        })
        .collect()
}
