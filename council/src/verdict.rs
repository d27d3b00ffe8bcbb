//! Tolerant PASS/FAIL extraction from judge responses.
//!
//! Judges are instructed to end with a bare `PASS` or `FAIL`, but real
//! models wander. The parser applies checks with diminishing
//! specificity: last line, last three lines, whole text, YES/NO
//! equivalents, labelled verdicts, conclusion phrasing, first/last
//! token. Only then does it give up with `Unclear`.

use std::sync::OnceLock;

use regex::Regex;

use gauntlet_protocol::Verdict;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| unreachable!())
}

fn word_pass() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\bPASS\b"))
}

fn word_fail() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\bFAIL\b"))
}

fn word_yes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\bYES\b"))
}

fn word_no() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\bNO\b"))
}

fn labelled_verdict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(r"(?:VERDICT|CONCLUSION|ANSWER|RESULT|FINAL|OUTCOME|DECISION|JUDGMENT)\s*:?\s*(PASS|FAIL|YES|NO)")
    })
}

fn concluded_verdict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"(?:I\s+)?(?:CONCLUDE|THUS|THEREFORE|HENCE)\s*:?\s*(PASS|FAIL|YES|NO)"))
}

fn uppercase_tokens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"\b[A-Z0-9]+\b"))
}

/// Replace punctuation with spaces so `**PASS**` and `PASS.` match as
/// plain words.
fn strip_punctuation(line: &str) -> String {
    line.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn exclusive(positive: bool, negative: bool) -> Option<Verdict> {
    match (positive, negative) {
        (true, false) => Some(Verdict::Pass),
        (false, true) => Some(Verdict::Fail),
        _ => None,
    }
}

fn from_keyword(word: &str) -> Option<Verdict> {
    match word {
        "PASS" | "YES" => Some(Verdict::Pass),
        "FAIL" | "NO" => Some(Verdict::Fail),
        _ => None,
    }
}

/// Parse a judge response into a verdict. Pure; returns
/// [`Verdict::Unclear`] when no check matches.
pub fn parse_verdict(text: &str) -> Verdict {
    if text.trim().is_empty() {
        return Verdict::Unclear;
    }
    let upper = text.to_uppercase();
    let lines: Vec<&str> = upper
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    // Last line alone is the strongest signal.
    if let Some(last) = lines.last() {
        let clean = strip_punctuation(last);
        let words: Vec<&str> = clean.split_whitespace().collect();
        if let Some(verdict) =
            exclusive(words.contains(&"PASS"), words.contains(&"FAIL"))
        {
            return verdict;
        }
    }

    // Then the last three lines, nearest first.
    for line in lines.iter().rev().take(3) {
        let clean = strip_punctuation(line);
        if let Some(verdict) =
            exclusive(word_pass().is_match(&clean), word_fail().is_match(&clean))
        {
            return verdict;
        }
        if let Some(verdict) =
            exclusive(word_yes().is_match(&clean), word_no().is_match(&clean))
        {
            return verdict;
        }
    }

    // Whole text, only when unambiguous.
    if let Some(verdict) = exclusive(word_pass().is_match(&upper), word_fail().is_match(&upper)) {
        return verdict;
    }
    if let Some(verdict) = exclusive(word_yes().is_match(&upper), word_no().is_match(&upper)) {
        return verdict;
    }

    // "Verdict: PASS", "Conclusion: FAIL", ...
    if let Some(caps) = labelled_verdict().captures(&upper)
        && let Some(verdict) = caps.get(1).and_then(|m| from_keyword(m.as_str()))
    {
        return verdict;
    }

    // "I conclude PASS", "Therefore: FAIL", ...
    if let Some(caps) = concluded_verdict().captures(&upper)
        && let Some(verdict) = caps.get(1).and_then(|m| from_keyword(m.as_str()))
    {
        return verdict;
    }

    // First or last significant uppercase token.
    let tokens: Vec<&str> = uppercase_tokens()
        .find_iter(&upper)
        .map(|m| m.as_str())
        .collect();
    if let (Some(first), Some(last)) = (tokens.first(), tokens.last()) {
        let passes = |word: &str| matches!(word, "PASS" | "YES" | "TRUE" | "1");
        let fails = |word: &str| matches!(word, "FAIL" | "NO" | "FALSE" | "0");
        if passes(first) || passes(last) {
            return Verdict::Pass;
        }
        if fails(first) || fails(last) {
            return Verdict::Fail;
        }
    }

    Verdict::Unclear
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_verdict_on_last_line() {
        assert_eq!(parse_verdict("The haiku meets both criteria.\nPASS"), Verdict::Pass);
        assert_eq!(parse_verdict("Missing the code mention.\nFAIL"), Verdict::Fail);
        assert_eq!(parse_verdict("**PASS**"), Verdict::Pass);
        assert_eq!(parse_verdict("fail."), Verdict::Fail);
    }

    #[test]
    fn conflicting_last_line_falls_through() {
        // "PASS or FAIL?" on the last line decides nothing; the verdict
        // two lines up does.
        assert_eq!(
            parse_verdict("Verdict: PASS\nSo that is my answer.\nPASS or FAIL, you asked."),
            Verdict::Pass
        );
    }

    #[test]
    fn verdict_in_last_three_lines() {
        assert_eq!(
            parse_verdict("Reasoning...\nThe response FAILs criterion C2.\nThat is all.\n—"),
            Verdict::Unclear,
        );
        assert_eq!(
            parse_verdict("Reasoning here.\nFAIL on C2.\nNothing else to add."),
            Verdict::Fail
        );
    }

    #[test]
    fn yes_no_are_accepted() {
        assert_eq!(parse_verdict("Is it aligned? Yes"), Verdict::Pass);
        assert_eq!(parse_verdict("Aligned with the metadata? No."), Verdict::Fail);
    }

    #[test]
    fn whole_text_single_mention() {
        assert_eq!(
            parse_verdict("Everything checks out, so I'd say this is a PASS given the rubric."),
            Verdict::Pass
        );
    }

    #[test]
    fn labelled_verdicts() {
        assert_eq!(
            parse_verdict("Both are defensible... Verdict: pass... FAIL would be harsh"),
            Verdict::Pass
        );
        assert_eq!(
            parse_verdict("Both PASS and FAIL appear. CONCLUSION: FAIL though PASS tempted me."),
            Verdict::Fail
        );
        assert_eq!(
            parse_verdict("My final ANSWER is... RESULT: NO ... though YES had merit"),
            Verdict::Fail
        );
    }

    #[test]
    fn conclusion_phrasing() {
        assert_eq!(
            parse_verdict("PASS and FAIL both appear above. Therefore: FAIL overall, PASS partially"),
            Verdict::Fail
        );
    }

    #[test]
    fn first_or_last_token_fallback() {
        assert_eq!(parse_verdict("TRUE, the grading aligns with the rubric criteria"), Verdict::Pass);
        assert_eq!(parse_verdict("0"), Verdict::Fail);
    }

    #[test]
    fn unparseable_is_unclear() {
        assert_eq!(parse_verdict(""), Verdict::Unclear);
        assert_eq!(
            parse_verdict("I cannot decide between the options."),
            Verdict::Unclear
        );
        assert_eq!(parse_verdict("Maybe. Hard to say, honestly."), Verdict::Unclear);
    }
}
