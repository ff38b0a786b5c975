//! Text cleanup and casing repair through the public API.

use medqa::text::{CLEANUP_RULES, TextChain};
use medqa::{cleanup, normalize_case};

/// Outputs of the kind the fine-tuned model actually produces.
const GENERATIONS: &[&str] = &[
    "Fever Is Usually A Sign Of Infection. || Drink Plenty Of Fluids.",
    "==~~ .hydration Is Key ##",
    "Take Ibuprofen...or Paracetamol!! Rest Well.",
    "|Symptoms| include cough\u{FFFD}, fever and fatigue.",
    "   <<>> [[Consult]] a doctor {{if}} pain persists \\\\ ",
    "a.\u{FFFD}.b c || d",
    "Wait\t\t.seriously ? ? yes",
];

#[test]
fn cleanup_is_idempotent_on_model_output() {
    for input in GENERATIONS {
        let once = cleanup(input);
        assert_eq!(cleanup(&once), once, "cleanup not idempotent for {input:?}");
    }
}

#[test]
fn cleanup_output_has_no_stitches_or_bars() {
    let symbols: Vec<char> = r"|+-=~*^#@<>{}[]\/:;,.!?".chars().collect();
    for input in GENERATIONS {
        let out = cleanup(input);
        assert!(!out.contains('|'), "bar left in {out:?}");
        assert!(!out.contains('\u{FFFD}'), "replacement char left in {out:?}");
        assert!(!out.contains("  "), "double space left in {out:?}");
        assert_eq!(out, out.trim(), "untrimmed output {out:?}");
        let chars: Vec<char> = out.chars().collect();
        for pair in chars.windows(2) {
            assert!(
                !(symbols.contains(&pair[0]) && symbols.contains(&pair[1])),
                "stitch {pair:?} left in {out:?}"
            );
        }
    }
}

#[test]
fn rule_table_is_ordered() {
    let names: Vec<&str> = CLEANUP_RULES.iter().map(|r| r.name).collect();
    assert_eq!(
        names,
        vec![
            "replacement-char",
            "chain-stitch",
            "stray-bar",
            "leading-dot",
            "whitespace-run"
        ]
    );
}

#[test]
fn documented_cleanup_examples() {
    assert_eq!(cleanup(" |hello|world|"), "helloworld");
    assert_eq!(cleanup("a||b"), "a b");
    assert_eq!(cleanup(".synthetic data"), "synthetic data");
    assert_eq!(cleanup("word .synthetic"), "word synthetic");
}

#[test]
fn documented_casing_example() {
    assert_eq!(
        normalize_case("Hello World. Another Test Here."),
        "Hello world. Another test here."
    );
}

#[test]
fn casing_keeps_first_word_of_every_sentence() {
    let input = "FEVER Means Infection. COUGH Means Irritation! WHY Though?";
    let out = normalize_case(input);
    for (before, after) in input.split(". ").zip(out.split(". ")) {
        assert_eq!(
            before.split_whitespace().next(),
            after.split_whitespace().next(),
            "first word changed in {after:?}"
        );
    }
    assert_eq!(out, "FEVER means infection. COUGH means irritation! WHY though?");
}

#[test]
fn full_chain_on_model_output() {
    let chain = TextChain::answer_normalization();
    assert_eq!(
        chain.apply(GENERATIONS[0]),
        "Fever is usually a sign of infection. Drink plenty of fluids."
    );
    assert_eq!(chain.apply(GENERATIONS[1]), "hydration is key");
    // A stitch swallows the terminator, so the sentences merge
    assert_eq!(
        chain.apply(GENERATIONS[2]),
        "Take ibuprofen or paracetamol rest well."
    );
}
