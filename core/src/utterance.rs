/// A message reduced to lowercase alphanumeric words for keyword matching.
///
/// Phrases are matched on whole-word boundaries, so "no" does not fire on
/// "know" and "hi" does not fire on "this".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    words: Vec<String>,
    /// Clause index of each word; clauses break on sentence punctuation.
    clauses: Vec<usize>,
}

const NEGATORS: [&str; 7] = ["not", "no", "never", "don", "dont", "doesn", "didn"];
/// How many preceding words of the same clause a negator reaches.
const NEGATION_WINDOW: usize = 4;
const CLAUSE_BREAKS: [char; 6] = ['.', ',', ';', ':', '!', '?'];

fn split_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

impl Utterance {
    pub fn new(text: &str) -> Self {
        let mut words = Vec::new();
        let mut clauses = Vec::new();
        for (clause, part) in text.split(CLAUSE_BREAKS).enumerate() {
            for word in split_words(part) {
                words.push(word);
                clauses.push(clause);
            }
        }
        Self { words, clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn positions(&self, phrase: &str) -> Vec<usize> {
        let needle = split_words(phrase);
        if needle.is_empty() || needle.len() > self.words.len() {
            return Vec::new();
        }
        self.words
            .windows(needle.len())
            .enumerate()
            .filter(|(_, window)| *window == needle.as_slice())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn contains(&self, phrase: &str) -> bool {
        !self.positions(phrase).is_empty()
    }

    pub fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|phrase| self.contains(phrase))
    }

    fn negated(&self, index: usize) -> bool {
        (index.saturating_sub(NEGATION_WINDOW)..index).any(|before| {
            self.clauses[before] == self.clauses[index]
                && NEGATORS.contains(&self.words[before].as_str())
        })
    }

    /// True when the phrase occurs at least once with no negator shortly
    /// before it in the same clause.
    pub fn contains_affirmed(&self, phrase: &str) -> bool {
        self.positions(phrase)
            .into_iter()
            .any(|index| !self.negated(index))
    }

    pub fn contains_any_affirmed(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|phrase| self.contains_affirmed(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::Utterance;

    #[test]
    fn matches_whole_words_only() {
        let u = Utterance::new("I know this is fine");
        assert!(!u.contains("no"));
        assert!(!u.contains("hi"));
        assert!(u.contains("know"));
    }

    #[test]
    fn matches_multi_word_phrases_across_punctuation() {
        let u = Utterance::new("How much?! I'd like the VIP-Package.");
        assert!(u.contains("how much"));
        assert!(u.contains("i'd like the"));
        assert!(u.contains("vip package"));
    }

    #[test]
    fn negated_phrases_are_not_affirmed() {
        let u = Utterance::new("I'm not interested");
        assert!(u.contains("interested"));
        assert!(!u.contains_affirmed("interested"));

        let u = Utterance::new("interested, yes");
        assert!(u.contains_affirmed("interested"));
    }

    #[test]
    fn negation_reaches_a_few_words_back() {
        assert!(!Utterance::new("not the vip").contains_affirmed("vip"));
        assert!(!Utterance::new("I don't want the VIP Package").contains_affirmed("vip package"));
        assert!(!Utterance::new("it doesn't need premium").contains_affirmed("premium"));
        assert!(Utterance::new("I'm not sure what else I'd want, maybe vip").contains_affirmed("vip"));
    }

    #[test]
    fn negation_stops_at_clause_breaks() {
        assert!(Utterance::new("no problem, yes").contains_affirmed("yes"));
        assert!(Utterance::new("Not that one. The VIP").contains_affirmed("vip"));
        assert!(!Utterance::new("no problem yes").contains_affirmed("yes"));
    }

    #[test]
    fn empty_phrase_never_matches() {
        let u = Utterance::new("anything");
        assert!(!u.contains(""));
        assert!(!u.contains("   "));
        assert!(Utterance::new(" !? ").is_empty());
    }
}
