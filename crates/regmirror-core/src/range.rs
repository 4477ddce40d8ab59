use std::fmt;

use semver::{Version, VersionReq};

const OPERATORS: [&str; 7] = [">=", "<=", ">", "<", "=", "~", "^"];

/// An npm range expression translated into `semver` requirements.
///
/// npm joins comparators with whitespace and alternatives with `||`; each
/// alternative becomes one comma-joined `VersionReq`, and a version matches
/// the range when any alternative matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut alternatives = Vec::new();
        for alternative in raw.split("||") {
            let translated = translate_comparator_set(alternative.trim())?;
            let requirement = VersionReq::parse(&translated)
                .map_err(|err| format!("'{}' is not a valid range: {err}", alternative.trim()))?;
            alternatives.push(requirement);
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            alternatives,
        })
    }

    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            alternatives: vec![VersionReq::STAR],
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn max_satisfying<'a, I>(&self, candidates: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|candidate| Version::parse(candidate).ok())
            .filter(|version| self.matches(version))
            .max()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for NpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn translate_comparator_set(set: &str) -> Result<String, String> {
    if set.is_empty() || set.split('.').all(is_wildcard) {
        return Ok("*".to_string());
    }

    if let Some((lower, upper)) = set.split_once(" - ") {
        let lower = strip_version_prefix(lower.trim());
        let upper = strip_version_prefix(upper.trim());
        if lower.is_empty() || upper.is_empty() {
            return Err(format!("incomplete hyphen range '{set}'"));
        }
        return Ok(match (precise_prefix(lower), precise_prefix(upper)) {
            (None, None) => "*".to_string(),
            (Some(lower), None) => format!(">={lower}"),
            (None, Some(upper)) => format!("<={upper}"),
            (Some(lower), Some(upper)) => format!(">={lower}, <={upper}"),
        });
    }

    let mut comparators = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in set.split_whitespace() {
        if let Some(operator) = pending_operator.take() {
            comparators.push(translate_comparator(operator, token)?);
            continue;
        }
        if OPERATORS.contains(&token) {
            pending_operator = Some(token);
            continue;
        }

        let (operator, version) = split_operator(token);
        comparators.push(translate_comparator(operator, version)?);
    }
    if let Some(operator) = pending_operator {
        return Err(format!("dangling operator '{operator}' in '{set}'"));
    }

    Ok(comparators.join(", "))
}

fn translate_comparator(operator: &str, version: &str) -> Result<String, String> {
    let version = strip_version_prefix(version);
    if version.is_empty() {
        return Err(format!("operator '{operator}' without a version"));
    }

    // A bare npm version means "exactly this, at the given precision"; `=1.2`
    // is the `semver` spelling of `1.2.x`.
    let operator = if operator.is_empty() { "=" } else { operator };
    Ok(match precise_prefix(version) {
        Some(precise) => format!("{operator}{precise}"),
        None => "*".to_string(),
    })
}

// `semver` rejects anything after a wildcard part, so `1.x.x` and `>=1.x`
// keep only `1`. `None` when the version is all wildcards.
fn precise_prefix(version: &str) -> Option<String> {
    if version.contains(['-', '+']) {
        return Some(version.to_string());
    }
    let precise = version
        .split('.')
        .take_while(|part| !is_wildcard(part))
        .collect::<Vec<_>>()
        .join(".");
    (!precise.is_empty()).then_some(precise)
}

fn split_operator(token: &str) -> (&str, &str) {
    for operator in OPERATORS {
        if let Some(rest) = token.strip_prefix(operator) {
            return (operator, rest);
        }
    }
    ("", token)
}

fn strip_version_prefix(version: &str) -> &str {
    let version = version.trim();
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "*" | "x" | "X")
}
