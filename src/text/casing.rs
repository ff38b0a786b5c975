//! Repair of spurious mid-sentence capitalization.
//!
//! Sentences end at `.`, `!` or `?` followed by whitespace. Within a
//! sentence the first word is kept verbatim; any later word containing an
//! uppercase letter is lowercased unless the word before it ends in `.`.

use crate::text::stage::TextStage;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Normalize casing sentence by sentence and rejoin with single spaces.
pub fn normalize_case(text: &str) -> String {
    split_sentences(text)
        .into_iter()
        .map(normalize_sentence)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split after each terminator, consuming the whitespace run that follows.
///
/// A trailing whitespace run yields a final empty sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && prev.is_some_and(|p| SENTENCE_TERMINATORS.contains(&p)) {
            sentences.push(&text[start..idx]);
            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = next_idx + next.len_utf8();
                chars.next();
            }
            start = end;
            prev = Some(' ');
            continue;
        }
        prev = Some(ch);
    }
    sentences.push(&text[start..]);
    sentences
}

fn normalize_sentence(sentence: &str) -> String {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let Some(first) = words.first() else {
        return sentence.to_string();
    };

    let mut out = Vec::with_capacity(words.len());
    out.push((*first).to_string());
    for pair in words.windows(2) {
        let (prev, word) = (pair[0], pair[1]);
        if word.chars().any(char::is_uppercase) && !prev.ends_with('.') {
            out.push(word.to_lowercase());
        } else {
            out.push(word.to_string());
        }
    }
    out.join(" ")
}

/// [`normalize_case`] as a chain stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseNormalizer;

impl TextStage for CaseNormalizer {
    fn apply(&self, text: &str) -> String {
        normalize_case(text)
    }

    fn name(&self) -> &'static str {
        "case-normalizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_mid_sentence_capitals() {
        assert_eq!(
            normalize_case("Hello World. Another Test Here."),
            "Hello world. Another test here."
        );
    }

    #[test]
    fn first_word_of_each_sentence_is_kept() {
        assert_eq!(normalize_case("ASPIRIN Helps! WATER Too?"), "ASPIRIN helps! WATER too?");
    }

    #[test]
    fn all_caps_word_is_fully_lowercased() {
        assert_eq!(normalize_case("EXTRA TEXT"), "EXTRA text");
    }

    #[test]
    fn mixed_case_word_is_lowercased() {
        assert_eq!(normalize_case("take iBuprofen"), "take ibuprofen");
    }

    #[test]
    fn lowercase_words_unchanged() {
        assert_eq!(normalize_case("drink plenty of fluids"), "drink plenty of fluids");
    }

    #[test]
    fn terminator_without_whitespace_does_not_split() {
        assert_eq!(normalize_case("See Dr.Smith Today"), "See dr.smith today");
    }

    #[test]
    fn multiple_whitespace_after_terminator_is_one_boundary() {
        assert_eq!(normalize_case("Rest.   Then Eat"), "Rest. Then eat");
        assert_eq!(normalize_case("Rest.\n\tThen Eat"), "Rest. Then eat");
    }

    #[test]
    fn inner_whitespace_collapses_to_single_spaces() {
        assert_eq!(normalize_case("one  two\tThree"), "one two three");
    }

    #[test]
    fn non_ascii_uppercase_is_lowercased() {
        assert_eq!(normalize_case("Sehr Ärgerlich"), "Sehr ärgerlich");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_case(""), "");
    }

    #[test]
    fn whitespace_only_sentence_passes_through() {
        assert_eq!(normalize_case("   "), "   ");
    }

    #[test]
    fn trailing_whitespace_after_terminator_yields_empty_sentence() {
        assert_eq!(split_sentences("Hi. "), vec!["Hi.", ""]);
        assert_eq!(normalize_case("Hi. "), "Hi. ");
    }

    #[test]
    fn split_sentences_on_each_terminator() {
        assert_eq!(
            split_sentences("A b. C d! E f? G"),
            vec!["A b.", "C d!", "E f?", "G"]
        );
    }

    #[test]
    fn split_sentences_handles_multibyte_whitespace() {
        assert_eq!(split_sentences("Ja.\u{3000}Nein"), vec!["Ja.", "Nein"]);
    }

    #[test]
    fn first_word_is_preserved() {
        for input in ["Hello World", "MRI Scan Needed", "x Y Z", "Über Alles"] {
            let first = input.split_whitespace().next();
            assert_eq!(
                normalize_case(input).split_whitespace().next(),
                first,
                "first word changed for {input:?}"
            );
        }
    }

    #[test]
    fn case_normalizer_stage_name() {
        assert_eq!(CaseNormalizer.name(), "case-normalizer");
        assert_eq!(CaseNormalizer.apply("A B"), "A b");
    }
}
