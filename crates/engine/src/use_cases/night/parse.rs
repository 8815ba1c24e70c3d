//! Lenient readers for free-text generator output.

use dollhouse_domain::NpcPlan;

use crate::use_cases::generation::parse_json_object;

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    // "1." / "2)" numbering
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))
        {
            return rest.trim_start();
        }
    }
    line
}

fn labelled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line[label.len()..].trim())
}

/// One insight per non-empty line, bullets and numbering removed.
pub fn parse_insights(response: &str, max_insights: usize) -> Vec<String> {
    response
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .take(max_insights)
        .map(str::to_string)
        .collect()
}

/// `LONG:`/`SHORT:` lines, then a `{"long_term", "short_term"}` object, then the first
/// line of text as the short-term plan. Returns `None` for an empty answer.
pub fn parse_plan(response: &str, previous: Option<&NpcPlan>, turn: u32) -> Option<NpcPlan> {
    let mut long_term = None;
    let mut short_term = None;
    for line in response.lines().map(strip_bullet) {
        if let Some(rest) = labelled(line, "LONG:") {
            long_term = Some(rest.to_string());
        } else if let Some(rest) = labelled(line, "SHORT:") {
            short_term = Some(rest.to_string());
        }
    }

    if long_term.is_none() && short_term.is_none() {
        if let Some(object) = parse_json_object(response) {
            let field = |key: &str| {
                object
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim().to_string())
            };
            long_term = field("long_term");
            short_term = field("short_term");
        }
    }

    if long_term.is_none() && short_term.is_none() {
        short_term = response
            .lines()
            .map(strip_bullet)
            .find(|line| !line.is_empty())
            .map(str::to_string);
    }

    let short_term = short_term.filter(|s| !s.is_empty());
    let long_term = long_term
        .filter(|s| !s.is_empty())
        .or_else(|| previous.map(|p| p.long_term.clone()))
        .or_else(|| short_term.clone())?;
    Some(NpcPlan {
        short_term: short_term.unwrap_or_else(|| long_term.clone()),
        long_term,
        planned_turn: turn,
    })
}

/// First non-empty line, without surrounding quotes or an echoed `Name:` prefix.
pub(super) fn clean_utterance(response: &str, speaker_name: &str) -> Option<String> {
    let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix(speaker_name)
        .and_then(|rest| rest.trim_start().strip_prefix(':'))
        .unwrap_or(line)
        .trim()
        .trim_matches('"')
        .trim();
    (!line.is_empty()).then(|| line.to_string())
}
