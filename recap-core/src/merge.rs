//! Text merge and budgeting for rolling summaries.
//!
//! A rendered summary is a two-field document:
//!
//! ```text
//! Summary so far:
//! <core>
//!
//! Recent messages:
//! <role: content lines>
//! ```
//!
//! Each merge folds the previous document's recent messages permanently into
//! its core, then renders the folded core plus the new turns under a
//! character budget. The recent section is reserved first so the newest
//! turns survive when space is tight.

use crate::config::BudgetConfig;
use crate::models::DialogueTurn;

pub const SUMMARY_HEADER: &str = "Summary so far:";
pub const RECENT_HEADER: &str = "Recent messages:";

const SECTION_SEPARATOR: &str = "\n\n";
const MIN_RECENT_CHARS: usize = 200;

/// Parsed form of a rendered summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryDocument {
    pub core: String,
    pub recents: String,
}

impl SummaryDocument {
    /// Parse a rendered summary.
    ///
    /// - both headers: core is the summary section, recents the recent section
    /// - summary header only: core is everything after it
    /// - recent header only: its content is promoted to core
    /// - no headers: the whole text is core
    ///
    /// Text ahead of the first header is kept as the start of core.
    pub fn parse(text: &str) -> Self {
        let summary_at = text.find(SUMMARY_HEADER);
        let recent_at = text.find(RECENT_HEADER);
        let summary_body = |s: usize, end: usize| &text[s + SUMMARY_HEADER.len()..end];
        let recent_body = |r: usize, end: usize| &text[r + RECENT_HEADER.len()..end];

        let (leading, core, recents) = match (summary_at, recent_at) {
            (Some(s), Some(r)) if s < r => (&text[..s], summary_body(s, r), recent_body(r, text.len())),
            (Some(s), Some(r)) => (&text[..r], summary_body(s, text.len()), recent_body(r, s)),
            (Some(s), None) => (&text[..s], summary_body(s, text.len()), ""),
            (None, Some(r)) => (&text[..r], recent_body(r, text.len()), ""),
            (None, None) => ("", text, ""),
        };

        Self {
            core: join_sections(&strip_headers(leading), &strip_headers(core)),
            recents: strip_headers(recents),
        }
    }

    /// Core with previous recents folded in.
    pub fn folded_core(&self) -> String {
        join_sections(&self.core, &self.recents)
    }
}

fn join_sections(first: &str, second: &str) -> String {
    [first, second]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn strip_headers(section: &str) -> String {
    section
        .replace(SUMMARY_HEADER, "")
        .replace(RECENT_HEADER, "")
        .trim()
        .to_string()
}

/// Truncate to at most `max_chars` Unicode scalar values.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// One `role: content` line per turn.
pub fn format_turns(turns: &[DialogueTurn]) -> String {
    turns
        .iter()
        .map(DialogueTurn::render_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merge with the default budget settings.
pub fn merge(prev_summary: &str, recent_turns: &[DialogueTurn], token_budget: Option<u32>) -> String {
    merge_with(prev_summary, recent_turns, token_budget, &BudgetConfig::default())
}

pub fn merge_with(
    prev_summary: &str,
    recent_turns: &[DialogueTurn],
    token_budget: Option<u32>,
    budget: &BudgetConfig,
) -> String {
    let max_chars = budget.max_chars_for(token_budget);
    let folded = SummaryDocument::parse(prev_summary).folded_core();
    let turns_text = format_turns(recent_turns);

    match (folded.is_empty(), turns_text.is_empty()) {
        (true, true) => String::new(),
        (false, true) => truncate_chars(&format!("{}\n{}", SUMMARY_HEADER, folded), max_chars),
        (true, false) => truncate_chars(&format!("{}\n{}", RECENT_HEADER, turns_text), max_chars),
        (false, false) => {
            let recent_budget = MIN_RECENT_CHARS.max(max_chars * 2 / 5);
            let recent_section =
                truncate_chars(&format!("{}\n{}", RECENT_HEADER, turns_text), recent_budget);

            let core_budget = max_chars
                .saturating_sub(char_len(&recent_section) + SECTION_SEPARATOR.len());
            let core_section = truncate_chars(&format!("{}\n{}", SUMMARY_HEADER, folded), core_budget);

            truncate_chars(
                &format!("{}{}{}", core_section, SECTION_SEPARATOR, recent_section),
                max_chars,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occurrences(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_parse_both_sections() {
        let doc = SummaryDocument::parse("Summary so far:\nCore X\n\nRecent messages:\nuser: old");
        assert_eq!(doc.core, "Core X");
        assert_eq!(doc.recents, "user: old");
        assert_eq!(doc.folded_core(), "Core X\nuser: old");
    }

    #[test]
    fn test_parse_recents_only_promotes_to_core() {
        let doc = SummaryDocument::parse("Recent messages:\nuser: hi\nassistant: hello");
        assert_eq!(doc.core, "user: hi\nassistant: hello");
        assert!(doc.recents.is_empty());
    }

    #[test]
    fn test_parse_summary_only() {
        let doc = SummaryDocument::parse("Summary so far:\nWorking on breath control.");
        assert_eq!(doc.core, "Working on breath control.");
        assert!(doc.recents.is_empty());
    }

    #[test]
    fn test_parse_headerless_text_is_core() {
        let doc = SummaryDocument::parse("The learner practiced a pitch intro.");
        assert_eq!(doc.core, "The learner practiced a pitch intro.");
    }

    #[test]
    fn test_parse_recent_header_before_summary_header() {
        let doc = SummaryDocument::parse(
            "Intro note\nRecent messages:\nuser: earlier\nSummary so far:\nCore Y",
        );
        assert_eq!(doc.core, "Intro note\nCore Y");
        assert_eq!(doc.recents, "user: earlier");
        assert_eq!(doc.folded_core(), "Intro note\nCore Y\nuser: earlier");
    }

    #[test]
    fn test_parse_keeps_text_ahead_of_summary_header() {
        let doc = SummaryDocument::parse("Preface\nSummary so far:\nCore Z\n\nRecent messages:\nuser: q");
        assert_eq!(doc.core, "Preface\nCore Z");
        assert_eq!(doc.recents, "user: q");
    }

    #[test]
    fn test_parse_strips_repeated_headers() {
        let doc = SummaryDocument::parse(
            "Summary so far:\nSummary so far:\nA\n\nRecent messages:\nRecent messages:\nuser: b",
        );
        assert_eq!(doc.core, "A");
        assert_eq!(doc.recents, "user: b");
    }

    #[test]
    fn test_merge_scenario_folds_old_recents() {
        let out = merge(
            "Summary so far:\nCore X\n\nRecent messages:\nuser: old",
            &[DialogueTurn::user("new")],
            None,
        );

        assert!(out.contains("Core X"));
        assert!(out.contains("old"));
        assert!(out.contains("new"));
        assert_eq!(occurrences(&out, SUMMARY_HEADER), 1);
        assert_eq!(occurrences(&out, RECENT_HEADER), 1);
        assert_eq!(
            out,
            "Summary so far:\nCore X\nuser: old\n\nRecent messages:\nuser: new"
        );
    }

    #[test]
    fn test_merge_empty_inputs_is_empty() {
        assert_eq!(merge("", &[], None), "");
        assert_eq!(merge("   \n", &[], Some(100)), "");
    }

    #[test]
    fn test_merge_core_only() {
        assert_eq!(merge("Just core", &[], None), "Summary so far:\nJust core");
    }

    #[test]
    fn test_merge_turns_only() {
        let out = merge(
            "",
            &[DialogueTurn::user("hi"), DialogueTurn::assistant("hello")],
            None,
        );
        assert_eq!(out, "Recent messages:\nuser: hi\nassistant: hello");
    }

    #[test]
    fn test_merge_twice_keeps_first_round_turns() {
        let first = merge("Summary so far:\nA", &[DialogueTurn::user("turn one")], None);
        let second = merge(&first, &[DialogueTurn::assistant("turn two")], None);

        assert!(second.contains("turn one"), "first-round turns folded into core");
        assert!(second.contains("turn two"));
        assert_eq!(occurrences(&second, SUMMARY_HEADER), 1);
    }

    #[test]
    fn test_merge_prioritizes_recents_when_tight() {
        let long_core = "c".repeat(5_000);
        let out = merge(&long_core, &[DialogueTurn::user("latest point")], Some(50));

        assert_eq!(char_len(&out), 400);
        assert!(out.ends_with("user: latest point"));
        assert!(out.starts_with(SUMMARY_HEADER));
    }

    #[test]
    fn test_merge_truncates_long_recents_to_reservation() {
        let turns: Vec<DialogueTurn> = (0..100)
            .map(|i| DialogueTurn::user(format!("message number {}", i)))
            .collect();
        let out = merge("core", &turns, None);

        assert!(char_len(&out) <= 2000);
        let recent_part = &out[out.find(RECENT_HEADER).unwrap()..];
        assert!(char_len(recent_part) <= 800);
        assert!(out.contains("core"));
    }

    #[test]
    fn test_merge_length_bounded_for_all_budgets() {
        let long_core = "x".repeat(20_000);
        let turns: Vec<DialogueTurn> = (0..400)
            .map(|i| DialogueTurn::assistant(format!("reply {} with some padding text", i)))
            .collect();
        let budget = BudgetConfig::default();

        for token_budget in [None, Some(0), Some(1), Some(49), Some(50), Some(250), Some(999), Some(1000), Some(100_000)] {
            let max = budget.max_chars_for(token_budget);
            for (prev, ts) in [
                ("", &turns[..]),
                (long_core.as_str(), &[][..]),
                (long_core.as_str(), &turns[..]),
                ("Recent messages:\nuser: x", &turns[..3]),
            ] {
                let out = merge(prev, ts, token_budget);
                assert!(
                    char_len(&out) <= max,
                    "budget {:?} produced {} chars (max {})",
                    token_budget,
                    char_len(&out),
                    max
                );
            }
        }
    }

    #[test]
    fn test_truncate_respects_multibyte_chars() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 4), "héll");
        assert_eq!(truncate_chars(text, 100), text);
    }
}
