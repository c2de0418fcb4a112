//! Approximate project matching by Levenshtein distance.

/// Largest edit distance that still counts as a match.
pub const MAX_DISTANCE: usize = 2;

/// Largest number of suggestions surfaced to the user.
pub const MAX_SUGGESTIONS: usize = 5;

/// Levenshtein edit distance between two strings.
pub fn distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// A near miss for a requested name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suggestion<'a, T> {
    pub item: &'a T,
    pub distance: usize,
}

/// Result of matching a requested name against a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzyMatch<'a, T> {
    /// Case-insensitive exact hit.
    Exact(&'a T),
    /// Candidates within [`MAX_DISTANCE`], nearest first. May be empty.
    Suggestions(Vec<Suggestion<'a, T>>),
}

impl<'a, T> FuzzyMatch<'a, T> {
    /// The candidate that can be used without asking: an exact hit, or a
    /// lone suggestion one edit away.
    pub fn confident(&self) -> Option<&'a T> {
        match self {
            FuzzyMatch::Exact(item) => Some(*item),
            FuzzyMatch::Suggestions(list) => match list.as_slice() {
                [only] if only.distance == 1 => Some(only.item),
                _ => None,
            },
        }
    }

    /// Suggested candidates, empty for an exact hit.
    pub fn suggestions(&self) -> impl Iterator<Item = &'a T> + '_ {
        let list = match self {
            FuzzyMatch::Exact(_) => None,
            FuzzyMatch::Suggestions(list) => Some(list),
        };
        list.into_iter().flatten().map(|s| s.item)
    }
}

/// Matches `query` against `candidates`, comparing the string `key` returns.
///
/// Ties in distance keep the candidates' original order.
pub fn find<'a, T, F>(query: &str, candidates: &'a [T], key: F) -> FuzzyMatch<'a, T>
where
    F: Fn(&T) -> &str,
{
    let query = query.trim().to_lowercase();

    if let Some(hit) = candidates
        .iter()
        .find(|c| key(*c).to_lowercase() == query)
    {
        return FuzzyMatch::Exact(hit);
    }

    let mut near: Vec<Suggestion<'a, T>> = candidates
        .iter()
        .map(|item| Suggestion {
            item,
            distance: distance(&query, &key(item).to_lowercase()),
        })
        .filter(|s| s.distance <= MAX_DISTANCE)
        .collect();

    // stable sort keeps list order for equal distances
    near.sort_by_key(|s| s.distance);
    near.truncate(MAX_SUGGESTIONS);

    FuzzyMatch::Suggestions(near)
}
