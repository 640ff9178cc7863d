//! Name matching shared by every resolution step.
//!
//! The canonical taxonomy and the legacy datasets were authored
//! independently, so names drift ("Engine Assembly" vs "Engine",
//! "F150" vs "F-150 Pickup"). Everything here is a pure function over a
//! candidate slice: the same inputs always pick the same winner, whatever
//! order the store returned the rows in.
//!
//! # Tie-break policy
//!
//! 1. Case-insensitive exact match beats containment.
//! 2. Containment (either direction) picks the shortest candidate name.
//! 3. Remaining ties go to the lexicographically smallest normalized name,
//!    then to the candidate's own key (id or ref id).

use std::collections::BTreeSet;

use crate::models::{ModelCrossReference, PartType};

/// Lowercases, trims, and collapses internal whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// How a candidate name relates to the query name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    Exact,
    Contains,
}

/// Compares two already-normalized names.
pub fn match_kind(needle: &str, candidate: &str) -> Option<MatchKind> {
    if needle.is_empty() || candidate.is_empty() {
        return None;
    }
    if needle == candidate {
        Some(MatchKind::Exact)
    } else if candidate.contains(needle) || needle.contains(candidate) {
        Some(MatchKind::Contains)
    } else {
        None
    }
}

/// Resolves free text (a part-code hint, a raw inventory `part_text`) to a
/// canonical part type.
pub fn match_part_type<'a>(hint: &str, part_types: &'a [PartType]) -> Option<&'a PartType> {
    let needle = normalize(hint);
    part_types
        .iter()
        .filter_map(|pt| {
            let name = normalize(&pt.name);
            match_kind(&needle, &name).map(|kind| ((kind, name.chars().count(), name, pt.id), pt))
        })
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, pt)| pt)
}

/// Picks the cross-reference for a canonical model.
///
/// Among candidates of the same match kind, references whose legacy make
/// name (or make hint) equals the model's make are preferred when present.
pub fn match_cross_reference<'a>(
    model_name: &str,
    make_name: &str,
    references: &'a [ModelCrossReference],
) -> Option<&'a ModelCrossReference> {
    let needle = normalize(model_name);
    let make = normalize(make_name);
    references
        .iter()
        .filter_map(|xref| {
            let name = normalize(&xref.legacy_model_name);
            let kind = match_kind(&needle, &name)?;
            let same_make = !make.is_empty()
                && (normalize(&xref.legacy_make_name) == make
                    || normalize(&xref.canonical_make_hint) == make);
            Some((
                (kind, !same_make, name.chars().count(), name, xref.ref_id.clone()),
                xref,
            ))
        })
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, xref)| xref)
}

/// Splits on anything that isn't alphanumeric and lowercases.
pub fn tokens(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of the smaller token set shared with the other, in `[0, 1]`.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let smaller = ta.len().min(tb.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f64 / smaller as f64
}

/// Minimum [`token_overlap`] accepted by the link pass.
pub const MIN_TOKEN_OVERLAP: f64 = 0.5;

/// How the link pass matched a raw text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkMethod {
    Exact,
    CaseInsensitive,
    TokenOverlap,
}

impl LinkMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMethod::Exact => "exact",
            LinkMethod::CaseInsensitive => "case_insensitive",
            LinkMethod::TokenOverlap => "token_overlap",
        }
    }
}

/// Links raw text to a canonical entity: exact, then case-insensitive, then
/// best token overlap.
///
/// `candidates` yields `(id, name)` pairs. Ties prefer the shorter name, then
/// the lower id.
pub fn link_text<'a, I>(text: &str, candidates: I) -> Option<(i64, LinkMethod)>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }
    let needle = normalize(raw);

    let mut best: Option<((LinkMethod, i64, usize, i64), i64)> = None;
    for (id, name) in candidates {
        let method = if name.trim() == raw {
            LinkMethod::Exact
        } else if normalize(name) == needle {
            LinkMethod::CaseInsensitive
        } else {
            let overlap = token_overlap(raw, name);
            if overlap < MIN_TOKEN_OVERLAP {
                continue;
            }
            // Higher overlap ranks first; scaled so it sorts as an integer.
            let score = -((overlap * 1000.0).round() as i64);
            let key = (LinkMethod::TokenOverlap, score, name.chars().count(), id);
            if best.as_ref().map_or(true, |(k, _)| key < *k) {
                best = Some((key, id));
            }
            continue;
        };
        let key = (method, 0, name.chars().count(), id);
        if best.as_ref().map_or(true, |(k, _)| key < *k) {
            best = Some((key, id));
        }
    }
    best.map(|((method, ..), id)| (id, method))
}

/// The first standalone all-digit token of a model name.
///
/// `"F-150"` gives `"150"`, `"Sierra 1500 HD"` gives `"1500"`, while
/// `"Civic Si 2dr"` and `"325i"` give nothing: digits glued to letters are
/// trim designations, not model numbers.
pub fn numeric_token(name: &str) -> Option<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .find(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Clamps a raw year range into `[min, max]`.
///
/// Returns `None` when the clamped range is empty, which also covers raw
/// rows with `start > end`.
pub fn clamp_range(start: i32, end: i32, min: i32, max: i32) -> Option<(i32, i32)> {
    let lo = start.max(min);
    let hi = end.min(max);
    (lo <= hi).then_some((lo, hi))
}

/// True when `year` falls inside the clamped range.
pub fn range_contains(start: i32, end: i32, year: i32, min: i32, max: i32) -> bool {
    clamp_range(start, end, min, max).is_some_and(|(lo, hi)| (lo..=hi).contains(&year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(id: i64, name: &str) -> PartType {
        PartType {
            id,
            name: name.to_string(),
        }
    }

    fn xref(ref_id: &str, make: &str, model: &str) -> ModelCrossReference {
        ModelCrossReference {
            ref_id: ref_id.to_string(),
            legacy_make_code: String::new(),
            legacy_make_name: make.to_string(),
            legacy_model_name: model.to_string(),
            canonical_make_hint: String::new(),
            canonical_model_hint: String::new(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Engine   Assembly "), "engine assembly");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_match_kind() {
        assert_eq!(match_kind("engine", "engine"), Some(MatchKind::Exact));
        assert_eq!(
            match_kind("engine assembly", "engine"),
            Some(MatchKind::Contains)
        );
        assert_eq!(match_kind("engine", "engine mount"), Some(MatchKind::Contains));
        assert_eq!(match_kind("alternator", "engine"), None);
        assert_eq!(match_kind("", "engine"), None);
    }

    #[test]
    fn test_part_type_shortest_containment_wins() {
        let parts = vec![pt(2, "Engine Control Module"), pt(1, "Engine")];
        let hit = match_part_type("Engine Assembly", &parts).unwrap();
        assert_eq!(hit.name, "Engine");
    }

    #[test]
    fn test_part_type_shortest_wins_regardless_of_order() {
        let a = vec![pt(1, "Engine Mount"), pt(2, "Engine")];
        let b = vec![pt(2, "Engine"), pt(1, "Engine Mount")];
        assert_eq!(match_part_type("engine", &a).unwrap().id, 2);
        assert_eq!(match_part_type("engine", &b).unwrap().id, 2);
    }

    #[test]
    fn test_part_type_exact_beats_shorter_containment() {
        let parts = vec![pt(1, "Door"), pt(2, "Door Mirror")];
        assert_eq!(match_part_type("door mirror", &parts).unwrap().id, 2);
    }

    #[test]
    fn test_part_type_lexicographic_tie_break() {
        let parts = vec![pt(1, "Hub B"), pt(2, "Hub A")];
        assert_eq!(match_part_type("Front Hub A Hub B", &parts).unwrap().id, 2);
    }

    #[test]
    fn test_part_type_no_match() {
        let parts = vec![pt(1, "Engine")];
        assert!(match_part_type("Alternator", &parts).is_none());
        assert!(match_part_type("", &parts).is_none());
    }

    #[test]
    fn test_cross_reference_exact_first() {
        let refs = vec![xref("9", "BMW", "325"), xref("7", "BMW", "325i")];
        assert_eq!(match_cross_reference("325i", "BMW", &refs).unwrap().ref_id, "7");
    }

    #[test]
    fn test_cross_reference_containment_either_direction() {
        let refs = vec![xref("11", "FORD", "TAURUS WAGON")];
        assert_eq!(
            match_cross_reference("Taurus", "Ford", &refs).unwrap().ref_id,
            "11"
        );
        let refs = vec![xref("12", "FORD", "F150")];
        assert_eq!(
            match_cross_reference("F150 Pickup", "Ford", &refs).unwrap().ref_id,
            "12"
        );
    }

    #[test]
    fn test_cross_reference_prefers_same_make() {
        let refs = vec![xref("1", "Mercury", "Sable"), xref("2", "Ford", "Sable")];
        assert_eq!(match_cross_reference("sable", "Ford", &refs).unwrap().ref_id, "2");
    }

    #[test]
    fn test_cross_reference_deterministic_under_reordering() {
        let mut refs = vec![
            xref("30", "", "Accord Coupe"),
            xref("20", "", "Accord Sedan"),
            xref("10", "", "Accord Wagon"),
        ];
        let first = match_cross_reference("Accord", "Honda", &refs)
            .unwrap()
            .ref_id
            .clone();
        refs.reverse();
        let second = match_cross_reference("Accord", "Honda", &refs)
            .unwrap()
            .ref_id
            .clone();
        assert_eq!(first, second);
        assert_eq!(first, "30");
    }

    #[test]
    fn test_token_overlap() {
        assert!((token_overlap("Grand Cherokee", "grand cherokee laredo") - 1.0).abs() < 1e-9);
        assert!((token_overlap("Ram 1500", "Ram 2500") - 0.5).abs() < 1e-9);
        assert_eq!(token_overlap("", "Ram"), 0.0);
    }

    #[test]
    fn test_link_text_methods() {
        let names = [(1, "Taurus"), (2, "Grand Cherokee"), (3, "F-150")];
        assert_eq!(
            link_text("Taurus", names.iter().copied()),
            Some((1, LinkMethod::Exact))
        );
        assert_eq!(
            link_text("TAURUS", names.iter().copied()),
            Some((1, LinkMethod::CaseInsensitive))
        );
        assert_eq!(
            link_text("Grand Cherokee Laredo", names.iter().copied()),
            Some((2, LinkMethod::TokenOverlap))
        );
        assert_eq!(link_text("Civic", names.iter().copied()), None);
        assert_eq!(link_text("  ", names.iter().copied()), None);
    }

    #[test]
    fn test_link_text_exact_beats_overlap() {
        let names = [(1, "Ram 1500"), (2, "Ram")];
        assert_eq!(
            link_text("Ram", names.iter().copied()),
            Some((2, LinkMethod::Exact))
        );
    }

    #[test]
    fn test_numeric_token() {
        assert_eq!(numeric_token("F-150"), Some("150".to_string()));
        assert_eq!(numeric_token("Sierra 1500 HD"), Some("1500".to_string()));
        assert_eq!(numeric_token("Civic Si 2dr"), None);
        assert_eq!(numeric_token("325i"), None);
        assert_eq!(numeric_token(""), None);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(1940, 1955, 1950, 2030), Some((1950, 1955)));
        assert_eq!(clamp_range(2025, 2040, 1950, 2030), Some((2025, 2030)));
        assert_eq!(clamp_range(2015, 2010, 1950, 2030), None);
        assert_eq!(clamp_range(1900, 1920, 1950, 2030), None);
    }

    #[test]
    fn test_range_contains() {
        assert!(range_contains(2010, 2015, 2013, 1950, 2030));
        assert!(!range_contains(2010, 2015, 2016, 1950, 2030));
        assert!(!range_contains(2015, 2010, 2012, 1950, 2030));
        assert!(!range_contains(1900, 2100, 2031, 1950, 2030));
    }
}
