use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Good,
    Moderate,
    Bad,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Good => "GOOD",
            Verdict::Moderate => "MODERATE",
            Verdict::Bad => "BAD",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

fn verdict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)VERDICT:\s*\[?\s*(GOOD|MODERATE|BAD)").expect("verdict pattern is valid"))
}

/// The first `VERDICT:` marker in `analysis`; `Moderate` when there is none.
pub fn extract_verdict(analysis: &str) -> Verdict {
    let Some(caps) = verdict_re().captures(analysis) else { return Verdict::Moderate };
    match caps[1].to_ascii_uppercase().as_str() {
        "GOOD" => Verdict::Good,
        "BAD" => Verdict::Bad,
        _ => Verdict::Moderate,
    }
}
