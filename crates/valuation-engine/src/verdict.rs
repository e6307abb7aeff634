use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Cheap,
    Fair,
    Expensive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub headline: String,
    pub sentiment: Sentiment,
    /// Mean of the component scores that were available
    pub average_score: Option<f64>,
}

const INSUFFICIENT: &str = "Insufficient data for valuation verdict";
const PREMIUM_JUSTIFIED: &str = "Premium valuation justified by growth";
const CHEAP_WEAK_GROWTH: &str = "Cheap historically but weak growth outlook";
const CHEAP: &str = "Attractively valued relative to history and peers";
const FAIR: &str = "Fairly valued relative to history and peers";
const EXPENSIVE: &str = "Expensive relative to history and peers";

/// Combine the component scores into a verdict.
///
/// Absent scores are left out of the average. The two growth overrides are
/// checked before the generic cheap/fair/expensive buckets.
pub fn verdict(historical: Option<u8>, peer: Option<u8>, growth: Option<u8>) -> Verdict {
    let present: Vec<f64> = [historical, peer, growth]
        .iter()
        .flatten()
        .map(|s| f64::from(*s))
        .collect();
    if present.is_empty() {
        return Verdict {
            headline: INSUFFICIENT.to_string(),
            sentiment: Sentiment::Fair,
            average_score: None,
        };
    }
    let average = present.iter().sum::<f64>() / present.len() as f64;

    let (headline, sentiment) = match (historical, growth) {
        (Some(h), Some(g)) if h >= 7 && g <= 4 => (PREMIUM_JUSTIFIED, Sentiment::Fair),
        (Some(h), Some(g)) if h <= 3 && g >= 7 => (CHEAP_WEAK_GROWTH, Sentiment::Fair),
        _ if average <= 3.5 => (CHEAP, Sentiment::Cheap),
        _ if average >= 6.5 => (EXPENSIVE, Sentiment::Expensive),
        _ => (FAIR, Sentiment::Fair),
    };

    Verdict {
        headline: headline.to_string(),
        sentiment,
        average_score: Some((average * 100.0).round() / 100.0),
    }
}
