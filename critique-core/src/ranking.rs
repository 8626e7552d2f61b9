//! Ranking engine: deterministic priority ordering of active recommendations.
//!
//! `score = impact_weight + confidence_weight` with impact high/medium/low =
//! 3/2/1 and confidence high/medium/low = 0.3/0.2/0.1. Scores are computed in
//! integer tenths so equal scores compare equal exactly. Votes are display-only
//! and never feed the score.

use serde::Serialize;

use crate::models::{Level, Recommendation};

/// Number of recommendations shown to the client at once.
pub const SLATE_SIZE: usize = 3;

pub fn impact_weight_tenths(level: Level) -> u32 {
    match level {
        Level::High => 30,
        Level::Medium => 20,
        Level::Low => 10,
    }
}

pub fn confidence_weight_tenths(level: Level) -> u32 {
    match level {
        Level::High => 3,
        Level::Medium => 2,
        Level::Low => 1,
    }
}

pub fn score_tenths(rec: &Recommendation) -> u32 {
    impact_weight_tenths(rec.impact) + confidence_weight_tenths(rec.confidence)
}

pub fn score(rec: &Recommendation) -> f64 {
    f64::from(score_tenths(rec)) / 10.0
}

/// Stable descending sort by score; equal scores keep their input order.
pub fn rank(mut recs: Vec<Recommendation>) -> Vec<Recommendation> {
    recs.sort_by(|a, b| score_tenths(b).cmp(&score_tenths(a)));
    recs
}

/// Client-facing view: the slate plus the full ranked set.
#[derive(Debug, Clone, Serialize)]
pub struct RankedPayload {
    pub top3: Vec<Recommendation>,
    pub all: Vec<Recommendation>,
}

impl RankedPayload {
    /// Rank the given active recommendations. Inactive rows are dropped.
    pub fn from_active(recs: Vec<Recommendation>) -> Self {
        let all = rank(recs.into_iter().filter(|r| r.active).collect());
        let top3 = all.iter().take(SLATE_SIZE).cloned().collect();
        Self { top3, all }
    }

    /// Ranked recommendations beyond the slate.
    pub fn backlog(&self) -> &[Recommendation] {
        &self.all[self.top3.len()..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn rec(key: &str, impact: Level, confidence: Level) -> Recommendation {
        Recommendation {
            key: key.to_string(),
            category: Category::Ui,
            title: key.to_string(),
            impact,
            confidence,
            why_it_matters: String::new(),
            what_to_change: vec![],
            acceptance_criteria: vec![],
            analytics: vec![],
            anchors: vec![],
            votes: 0,
            active: true,
            position: 0,
        }
    }

    fn keys(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.key.as_str()).collect()
    }

    fn scenario() -> Vec<Recommendation> {
        use Level::*;
        let impacts = [High, High, Medium, Medium, Low, Low, Low];
        let confidences = [High, Medium, High, Low, Medium, Low, Low];
        impacts
            .iter()
            .zip(confidences.iter())
            .enumerate()
            .map(|(i, (imp, conf))| rec(&format!("r{}", i + 1), *imp, *conf))
            .collect()
    }

    #[test]
    fn test_score_weights() {
        assert_eq!(score(&rec("a", Level::High, Level::High)), 3.3);
        assert_eq!(score(&rec("b", Level::Medium, Level::Low)), 2.1);
        assert_eq!(score(&rec("c", Level::Low, Level::Low)), 1.1);
    }

    #[test]
    fn test_scenario_ranking() {
        let payload = RankedPayload::from_active(scenario());

        assert_eq!(score(&payload.all[0]), 3.3);
        assert_eq!(payload.all[0].key, "r1");
        assert_eq!(keys(&payload.top3), vec!["r1", "r2", "r3"]);
        assert_eq!(
            keys(&payload.all),
            vec!["r1", "r2", "r3", "r4", "r5", "r6", "r7"]
        );
        let scores: Vec<f64> = payload.top3.iter().map(score).collect();
        assert_eq!(scores, vec![3.3, 3.2, 2.3]);
        assert_eq!(keys(payload.backlog()), vec!["r4", "r5", "r6", "r7"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let input = vec![
            rec("low-1", Level::Low, Level::Low),
            rec("tie-a", Level::Medium, Level::Medium),
            rec("tie-b", Level::Medium, Level::Medium),
            rec("top", Level::High, Level::Low),
            rec("tie-c", Level::Medium, Level::Medium),
        ];
        assert_eq!(
            keys(&rank(input)),
            vec!["top", "tie-a", "tie-b", "tie-c", "low-1"]
        );

        let reordered = vec![
            rec("tie-c", Level::Medium, Level::Medium),
            rec("top", Level::High, Level::Low),
            rec("tie-a", Level::Medium, Level::Medium),
            rec("low-1", Level::Low, Level::Low),
            rec("tie-b", Level::Medium, Level::Medium),
        ];
        assert_eq!(
            keys(&rank(reordered)),
            vec!["top", "tie-c", "tie-a", "tie-b", "low-1"]
        );
    }

    #[test]
    fn test_rank_is_deterministic() {
        let first = rank(scenario());
        for _ in 0..10 {
            assert_eq!(keys(&rank(scenario())), keys(&first));
        }
    }

    #[test]
    fn test_votes_do_not_affect_order() {
        let mut recs = scenario();
        recs[6].votes = 1_000;
        let payload = RankedPayload::from_active(recs);
        assert_eq!(payload.all.last().unwrap().key, "r7");
        assert_eq!(payload.all.last().unwrap().votes, 1_000);
    }

    #[test]
    fn test_inactive_rows_are_excluded() {
        let mut recs = scenario();
        recs[0].active = false;
        let payload = RankedPayload::from_active(recs);
        assert_eq!(payload.all.len(), 6);
        assert_eq!(keys(&payload.top3), vec!["r2", "r3", "r4"]);
    }

    #[test]
    fn test_small_sets_have_short_slates() {
        let payload = RankedPayload::from_active(vec![rec("only", Level::Low, Level::High)]);
        assert_eq!(payload.top3.len(), 1);
        assert!(payload.backlog().is_empty());

        let empty = RankedPayload::from_active(vec![]);
        assert!(empty.top3.is_empty());
        assert!(empty.all.is_empty());
    }
}
