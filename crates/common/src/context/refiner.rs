//! Query Refiner - Reduces a conversational question to retrieval keywords
//!
//! Filler phrases are removed by substring elimination, one ordered family
//! at a time, then short tokens are dropped unless they are known medical
//! keywords.

use regex_lite::Regex;
use std::collections::HashSet;

/// Medical keywords kept regardless of length
pub const MEDICAL_KEYWORDS: &[&str] = &[
    "진료기록", "의료법", "법적", "효력", "합병증", "처방전",
    "회복", "기간", "진료", "통증", "주의사항", "건강보험",
];

/// Ordered filler families: question endings, particles/connectors,
/// closing questions.
pub const FILLER_PATTERNS: &[&str] = &[
    r"(이란\?|무엇인가요\?|의 목적이 무엇인가요\?|이 궁금합니다\?|무엇이죠\?|뭐야\?|무엇이에요\?)",
    r"(을|를|의|에 대한|에 대해|에 관하여|에 대하여|을 알고 싶어요)",
    r"(어떤가요\?|어떻게 하나요\?|알려주세요\?|정의는\?|목적은\?)",
];

/// Tokens longer than this many characters are always kept
const MIN_TOKEN_CHARS: usize = 2;

/// Query refiner configuration
#[derive(Debug, Clone)]
pub struct QueryRefinerConfig {
    /// Filler families, applied in order
    pub filler_patterns: Vec<String>,

    /// Keywords that survive the length filter
    pub keywords: Vec<String>,

    /// Keep tokens whose character count exceeds this
    pub min_token_chars: usize,
}

impl Default for QueryRefinerConfig {
    fn default() -> Self {
        Self {
            filler_patterns: FILLER_PATTERNS.iter().map(|p| p.to_string()).collect(),
            keywords: MEDICAL_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_token_chars: MIN_TOKEN_CHARS,
        }
    }
}

/// Query refiner for turning utterances into search queries
#[derive(Debug, Clone)]
pub struct QueryRefiner {
    fillers: Vec<Regex>,
    keywords: HashSet<String>,
    min_token_chars: usize,
}

impl QueryRefiner {
    /// Create a refiner; invalid filler patterns are reported
    pub fn new(config: QueryRefinerConfig) -> Result<Self, regex_lite::Error> {
        let fillers = config
            .filler_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fillers,
            keywords: config.keywords.into_iter().collect(),
            min_token_chars: config.min_token_chars,
        })
    }

    /// Refine a (redacted) utterance.
    ///
    /// Output tokens are an order-preserving subsequence of the input
    /// tokens after filler removal. An empty result means there was no
    /// meaningful query.
    pub fn refine(&self, input: &str) -> String {
        let mut text = input.trim().to_string();
        for filler in &self.fillers {
            text = filler.replace_all(&text, "").into_owned();
        }

        text.split_whitespace()
            .filter(|token| self.keep(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn keep(&self, token: &str) -> bool {
        self.keywords.contains(token) || token.chars().count() > self.min_token_chars
    }
}

impl Default for QueryRefiner {
    fn default() -> Self {
        let config = QueryRefinerConfig::default();
        let fillers = config
            .filler_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            fillers,
            keywords: config.keywords.into_iter().collect(),
            min_token_chars: config.min_token_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refiner() -> QueryRefiner {
        QueryRefiner::new(QueryRefinerConfig::default()).unwrap()
    }

    fn is_subsequence(needle: &[&str], haystack: &[&str]) -> bool {
        let mut it = haystack.iter();
        needle.iter().all(|n| it.any(|h| h == n))
    }

    #[test]
    fn test_default_patterns_compile() {
        assert_eq!(refiner().fillers.len(), 3);
        assert_eq!(QueryRefiner::default().fillers.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(refiner().refine(""), "");
        assert_eq!(refiner().refine("   \t "), "");
    }

    #[test]
    fn test_redacted_prompt_scenario() {
        let refined = refiner().refine("제 주민번호는 123456-******* 입니다 진료기록이 궁금합니다");
        assert!(refined.contains("진료기록"));
        assert!(!refined.split(' ').any(|t| t == "제"));
        assert_eq!(refined, "주민번호는 123456-******* 입니다 진료기록이 궁금합니다");
    }

    #[test]
    fn test_question_endings_removed() {
        assert_eq!(refiner().refine("합병증이란?"), "합병증");
        // "유효" is two characters and not a keyword
        assert_eq!(refiner().refine("처방전 유효 기간은 무엇인가요?"), "처방전 기간은");
    }

    #[test]
    fn test_particles_removed_before_length_filter() {
        // "통증을" loses its particle and survives as a keyword
        assert_eq!(refiner().refine("수술 후 통증을 알고 싶어요"), "통증 싶어요");
    }

    #[test]
    fn test_short_keywords_kept() {
        assert_eq!(refiner().refine("법적 효력 은 요"), "법적 효력");
    }

    #[test]
    fn test_all_filler_yields_empty() {
        assert_eq!(refiner().refine("뭐야? 을 를"), "");
    }

    #[test]
    fn test_tokens_are_subsequence() {
        let input = "두통 원인이 뭔가요? 그리고 회복 기간 알려주세요?";
        let refined = refiner().refine(input);
        let out: Vec<&str> = refined.split_whitespace().collect();
        let tokens: Vec<&str> = input.split_whitespace().collect();
        assert!(is_subsequence(&out, &tokens));
        assert_eq!(refined, "원인이 뭔가요? 그리고 회복 기간");
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let config = QueryRefinerConfig {
            filler_patterns: vec!["(".to_string()],
            ..QueryRefinerConfig::default()
        };
        assert!(QueryRefiner::new(config).is_err());
    }
}
