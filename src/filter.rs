/// Offer-text gate over recognized screen text.
///
/// Consumes the tokens produced by the text-recognition capability, pulls a
/// currency amount and a unit-suffixed distance out of them, and compares
/// against the configured criteria.
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RecognizeError};
use crate::frame::Frame;

/// One unit of recognized text with its confidence and pixel bounds
/// (left, top, right, bottom) inside the frame it came from.
#[derive(Debug, Clone)]
pub struct TextToken {
    pub text: String,
    pub confidence: f32,
    pub bounds: (u32, u32, u32, u32),
}

/// Text-recognition boundary. Implementations may fail or return an empty
/// list; both are treated as "nothing readable this cycle".
pub trait TextRecognizer: Send {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<TextToken>, RecognizeError>;
}

/// User-configured acceptance criteria.
///
/// `bypass` replicates a behavior observed in the field where matched
/// triggers were dispatched regardless of criteria. It is an explicit
/// opt-in and defaults to off; when set, verdicts are still computed and
/// reported, but never block dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterCriteria {
    pub min_amount: Option<f64>,
    pub max_distance: Option<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub bypass: bool,
}

impl FilterCriteria {
    /// True when any criterion is configured, i.e. the gate has work to do.
    pub fn is_restrictive(&self) -> bool {
        self.min_amount.is_some() || self.max_distance.is_some() || !self.keywords.is_empty()
    }
}

/// Values extracted from the recognized text, forwarded as context on
/// dispatch and manual-intervention events.
#[derive(Debug, Clone, Default)]
pub struct OfferDetails {
    pub amount: Option<f64>,
    pub distance: Option<f64>,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub accepted: bool,
    /// True when acceptance came from the bypass flag, not the criteria.
    pub bypassed: bool,
    pub details: OfferDetails,
}

/// Tokens below this confidence are treated as recognition noise.
const MIN_TOKEN_CONFIDENCE: f32 = 0.2;

pub struct FilterEvaluator {
    criteria: FilterCriteria,
    amount_re: Regex,
    distance_re: Regex,
}

impl FilterEvaluator {
    pub fn new(criteria: FilterCriteria) -> Result<Self, ConfigError> {
        let amount_re = Regex::new(r"[$€£]\s*([0-9]+(?:[.,][0-9]{1,2})?)")
            .map_err(|e| ConfigError::Invalid(format!("amount pattern: {e}")))?;
        let distance_re = Regex::new(r"(?i)\b([0-9]+(?:[.,][0-9]+)?)\s*(mi|mile|miles|km|kilometre|kilometres|kilometer|kilometers)\b")
            .map_err(|e| ConfigError::Invalid(format!("distance pattern: {e}")))?;
        Ok(Self {
            criteria,
            amount_re,
            distance_re,
        })
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Pull amount, distance and keyword hits out of the token list.
    ///
    /// When several values appear (stacked offers, tip lines), the largest
    /// is kept for both amount and distance. That is conservative for a
    /// max-distance criterion and matches how totals are displayed.
    pub fn extract(&self, tokens: &[TextToken]) -> OfferDetails {
        let mut details = OfferDetails::default();

        for token in tokens {
            if token.confidence < MIN_TOKEN_CONFIDENCE {
                continue;
            }
            for capture in self.amount_re.captures_iter(&token.text) {
                if let Some(value) = parse_number(&capture[1]) {
                    details.amount = Some(details.amount.map_or(value, |a: f64| a.max(value)));
                }
            }
            for capture in self.distance_re.captures_iter(&token.text) {
                if let Some(value) = parse_number(&capture[1]) {
                    details.distance =
                        Some(details.distance.map_or(value, |d: f64| d.max(value)));
                }
            }

            let lowered = token.text.to_lowercase();
            for keyword in &self.criteria.keywords {
                if !keyword.is_empty()
                    && lowered.contains(&keyword.to_lowercase())
                    && !details.matched_keywords.contains(keyword)
                {
                    details.matched_keywords.push(keyword.clone());
                }
            }
        }

        details
    }

    /// Compare the extracted values against the criteria.
    ///
    /// A criterion whose value could not be extracted rejects: an offer we
    /// cannot verify is treated as not matching.
    pub fn evaluate(&self, tokens: &[TextToken]) -> FilterVerdict {
        let details = self.extract(tokens);

        let amount_ok = match self.criteria.min_amount {
            Some(min) => details.amount.map_or(false, |a| a >= min),
            None => true,
        };
        let distance_ok = match self.criteria.max_distance {
            Some(max) => details.distance.map_or(false, |d| d <= max),
            None => true,
        };
        let keywords_ok = self.criteria.keywords.is_empty()
            || details.matched_keywords.len() == self.criteria.keywords.len();

        let matches = amount_ok && distance_ok && keywords_ok;
        FilterVerdict {
            accepted: matches || self.criteria.bypass,
            bypassed: self.criteria.bypass && !matches,
            details,
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> TextToken {
        TextToken {
            text: text.to_string(),
            confidence: 0.9,
            bounds: (0, 0, 100, 20),
        }
    }

    fn evaluator(criteria: FilterCriteria) -> FilterEvaluator {
        FilterEvaluator::new(criteria).unwrap()
    }

    #[test]
    fn test_extracts_amount_and_distance() {
        let eval = evaluator(FilterCriteria::default());
        let details = eval.extract(&[token("$12.50 total"), token("3.2 mi away")]);
        assert_eq!(details.amount, Some(12.5));
        assert_eq!(details.distance, Some(3.2));
    }

    #[test]
    fn test_keeps_largest_of_stacked_values() {
        let eval = evaluator(FilterCriteria::default());
        let details = eval.extract(&[token("$8.00 + $4.25 tip"), token("1.1 mi then 4.7 mi")]);
        assert_eq!(details.amount, Some(8.0));
        assert_eq!(details.distance, Some(4.7));
    }

    #[test]
    fn test_european_formats() {
        let eval = evaluator(FilterCriteria::default());
        let details = eval.extract(&[token("€9,75"), token("2,4 km")]);
        assert_eq!(details.amount, Some(9.75));
        assert_eq!(details.distance, Some(2.4));
    }

    #[test]
    fn test_criteria_accept_and_reject() {
        let eval = evaluator(FilterCriteria {
            min_amount: Some(10.0),
            max_distance: Some(5.0),
            keywords: vec![],
            bypass: false,
        });

        let good = eval.evaluate(&[token("$14.00"), token("2.0 mi")]);
        assert!(good.accepted);
        assert!(!good.bypassed);

        let low_pay = eval.evaluate(&[token("$6.00"), token("2.0 mi")]);
        assert!(!low_pay.accepted);

        let too_far = eval.evaluate(&[token("$14.00"), token("9.5 mi")]);
        assert!(!too_far.accepted);
    }

    #[test]
    fn test_unverifiable_criterion_rejects() {
        let eval = evaluator(FilterCriteria {
            min_amount: Some(10.0),
            max_distance: None,
            keywords: vec![],
            bypass: false,
        });

        // No amount anywhere in the text.
        let verdict = eval.evaluate(&[token("Accept now"), token("3.1 mi")]);
        assert!(!verdict.accepted);
    }

    #[test]
    fn test_keyword_containment_is_case_insensitive() {
        let eval = evaluator(FilterCriteria {
            min_amount: None,
            max_distance: None,
            keywords: vec!["priority".to_string()],
            bypass: false,
        });

        assert!(eval.evaluate(&[token("PRIORITY delivery $5")]).accepted);
        assert!(!eval.evaluate(&[token("standard delivery $5")]).accepted);
    }

    #[test]
    fn test_bypass_accepts_but_flags() {
        let eval = evaluator(FilterCriteria {
            min_amount: Some(100.0),
            max_distance: None,
            keywords: vec![],
            bypass: true,
        });

        let verdict = eval.evaluate(&[token("$5.00")]);
        assert!(verdict.accepted);
        assert!(verdict.bypassed);
        assert_eq!(verdict.details.amount, Some(5.0));

        // Criteria met on merit: accepted without the bypass flag.
        let verdict = eval.evaluate(&[token("$150.00")]);
        assert!(verdict.accepted);
        assert!(!verdict.bypassed);
    }

    #[test]
    fn test_low_confidence_tokens_are_ignored() {
        let eval = evaluator(FilterCriteria::default());
        let noisy = TextToken {
            text: "$99.00".to_string(),
            confidence: 0.05,
            bounds: (0, 0, 100, 20),
        };

        let details = eval.extract(&[noisy, token("2.0 mi")]);
        assert_eq!(details.amount, None);
        assert_eq!(details.distance, Some(2.0));
    }

    #[test]
    fn test_bypass_defaults_off() {
        assert!(!FilterCriteria::default().bypass);
    }
}
