//! Ordered text transforms applied to decoded model output.

use crate::text::casing::CaseNormalizer;
use crate::text::cleanup::Cleanup;

/// A pure string → string transform.
pub trait TextStage: Send + Sync {
    /// Transform text. Never fails.
    fn apply(&self, text: &str) -> String;

    /// Name for logging/diagnostics.
    fn name(&self) -> &'static str;
}

/// Stages applied in order, each to the previous stage's output.
pub struct TextChain {
    stages: Vec<Box<dyn TextStage>>,
}

impl TextChain {
    pub fn new(stages: Vec<Box<dyn TextStage>>) -> Self {
        Self { stages }
    }

    /// Chain used for every answer: chain-stitch cleanup, then casing repair.
    pub fn answer_normalization() -> Self {
        Self::new(vec![Box::new(Cleanup), Box::new(CaseNormalizer)])
    }

    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for stage in &self.stages {
            current = stage.apply(&current);
            tracing::trace!(stage = stage.name(), "{current}");
        }
        current
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for TextChain {
    fn default() -> Self {
        Self::answer_normalization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl TextStage for Upper {
        fn apply(&self, text: &str) -> String {
            text.to_uppercase()
        }

        fn name(&self) -> &'static str {
            "upper"
        }
    }

    struct Exclaim;

    impl TextStage for Exclaim {
        fn apply(&self, text: &str) -> String {
            format!("{text}!")
        }

        fn name(&self) -> &'static str {
            "exclaim"
        }
    }

    #[test]
    fn chain_applies_stages_in_order() {
        let chain = TextChain::new(vec![Box::new(Exclaim), Box::new(Upper)]);
        assert_eq!(chain.apply("hi"), "HI!");
        assert_eq!(chain.stage_names(), vec!["exclaim", "upper"]);
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = TextChain::new(Vec::new());
        assert_eq!(chain.apply("  as is  "), "  as is  ");
    }

    #[test]
    fn answer_normalization_runs_cleanup_before_casing() {
        let chain = TextChain::answer_normalization();
        assert_eq!(chain.stage_names(), vec!["cleanup", "case-normalizer"]);
        assert_eq!(chain.apply("Take The ## Pills||Daily"), "Take the pills daily");
    }

    #[test]
    fn text_stage_trait_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<Box<dyn TextStage>>();
    }
}
