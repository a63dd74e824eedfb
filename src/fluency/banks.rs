//! Five-tier problem bank for one (student, operation) record.
//!
//! `upsert` is the single mutation point that places a problem into a tier and it
//! always evicts any stale entry first, so a `problemId` can only ever live in one
//! tier. Deserialization goes through the same path, which collapses duplicated
//! legacy documents on load.

use serde::{Deserialize, Serialize};

use crate::fluency::progress::ProblemProgress;
use crate::fluency::types::Tier;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredBanks")]
pub struct ProblemBanks {
    does_not_know: Vec<ProblemProgress>,
    emerging: Vec<ProblemProgress>,
    approaching: Vec<ProblemProgress>,
    proficient: Vec<ProblemProgress>,
    mastered: Vec<ProblemProgress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBanks {
    #[serde(default)]
    does_not_know: Vec<ProblemProgress>,
    #[serde(default)]
    emerging: Vec<ProblemProgress>,
    #[serde(default)]
    approaching: Vec<ProblemProgress>,
    #[serde(default)]
    proficient: Vec<ProblemProgress>,
    #[serde(default)]
    mastered: Vec<ProblemProgress>,
}

impl From<StoredBanks> for ProblemBanks {
    fn from(stored: StoredBanks) -> Self {
        let mut banks = ProblemBanks::default();
        let tiers = [
            (Tier::DoesNotKnow, stored.does_not_know),
            (Tier::Emerging, stored.emerging),
            (Tier::Approaching, stored.approaching),
            (Tier::Proficient, stored.proficient),
            (Tier::Mastered, stored.mastered),
        ];
        for (tier, entries) in tiers {
            for progress in entries {
                if let Some(previous) = banks.upsert(progress, tier) {
                    tracing::warn!(
                        previous = %previous,
                        kept = %tier,
                        "duplicate problem collapsed while loading banks"
                    );
                }
            }
        }
        banks
    }
}

impl ProblemBanks {
    pub fn tier(&self, tier: Tier) -> &[ProblemProgress] {
        match tier {
            Tier::DoesNotKnow => &self.does_not_know,
            Tier::Emerging => &self.emerging,
            Tier::Approaching => &self.approaching,
            Tier::Proficient => &self.proficient,
            Tier::Mastered => &self.mastered,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut Vec<ProblemProgress> {
        match tier {
            Tier::DoesNotKnow => &mut self.does_not_know,
            Tier::Emerging => &mut self.emerging,
            Tier::Approaching => &mut self.approaching,
            Tier::Proficient => &mut self.proficient,
            Tier::Mastered => &mut self.mastered,
        }
    }

    /// Insert into `tier`, evicting any existing entry with the same id from every
    /// tier. Returns the tier the stale entry was evicted from, if any.
    pub fn upsert(&mut self, mut progress: ProblemProgress, tier: Tier) -> Option<Tier> {
        let previous = self.remove(progress.problem_id()).map(|p| p.proficiency_level);
        progress.proficiency_level = tier;
        self.tier_mut(tier).push(progress);
        previous
    }

    pub fn get(&self, problem_id: &str) -> Option<&ProblemProgress> {
        self.all_problems().find(|p| p.problem_id() == problem_id)
    }

    pub fn contains(&self, problem_id: &str) -> bool {
        self.get(problem_id).is_some()
    }

    pub fn locate(&self, problem_id: &str) -> Option<Tier> {
        self.get(problem_id).map(|p| p.proficiency_level)
    }

    /// Take the problem out of whichever tier holds it.
    pub fn remove(&mut self, problem_id: &str) -> Option<ProblemProgress> {
        let mut removed = None;
        for &tier in Tier::all() {
            let bucket = self.tier_mut(tier);
            while let Some(pos) = bucket.iter().position(|p| p.problem_id() == problem_id) {
                let entry = bucket.remove(pos);
                if removed.is_none() {
                    removed = Some(entry);
                }
            }
        }
        removed
    }

    /// No-op (logged) when the problem is not currently in `from`; the caller's view of
    /// tier membership may be stale.
    pub fn move_tier(&mut self, problem_id: &str, from: Tier, to: Tier) -> bool {
        let bucket = self.tier_mut(from);
        let Some(pos) = bucket.iter().position(|p| p.problem_id() == problem_id) else {
            tracing::warn!(problem_id, from = %from, to = %to, "tier move skipped: problem not in source tier");
            return false;
        };
        let mut progress = bucket.remove(pos);
        progress.proficiency_level = to;
        self.tier_mut(to).push(progress);
        true
    }

    /// Every known problem, tier by tier from `doesNotKnow` to `mastered`, insertion
    /// order within a tier.
    pub fn all_problems(&self) -> impl Iterator<Item = &ProblemProgress> {
        Tier::all().iter().flat_map(move |&tier| self.tier(tier).iter())
    }

    /// Proficient and mastered problems.
    pub fn secure_problems(&self) -> impl Iterator<Item = &ProblemProgress> {
        self.proficient.iter().chain(self.mastered.iter())
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.tier(tier).len()
    }

    pub fn len(&self) -> usize {
        Tier::all().iter().map(|&t| self.count(t)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluency::problem::Problem;
    use crate::fluency::types::Operation;

    fn progress(left: u32, right: u32) -> ProblemProgress {
        ProblemProgress::new(Problem::new(Operation::Addition, left, right).unwrap())
    }

    #[test]
    fn test_upsert_evicts_from_other_tiers() {
        let mut banks = ProblemBanks::default();
        assert_eq!(banks.upsert(progress(1, 1), Tier::Emerging), None);
        assert_eq!(banks.upsert(progress(1, 1), Tier::Mastered), Some(Tier::Emerging));
        assert_eq!(banks.len(), 1);
        assert_eq!(banks.count(Tier::Emerging), 0);
        assert_eq!(banks.locate("addition:1:1"), Some(Tier::Mastered));
    }

    #[test]
    fn test_upsert_same_tier_is_idempotent() {
        let mut banks = ProblemBanks::default();
        banks.upsert(progress(2, 3), Tier::Proficient);
        banks.upsert(progress(2, 3), Tier::Proficient);
        assert_eq!(banks.count(Tier::Proficient), 1);
    }

    #[test]
    fn test_move_tier_missing_is_noop() {
        let mut banks = ProblemBanks::default();
        banks.upsert(progress(2, 3), Tier::Emerging);
        assert!(!banks.move_tier("addition:2:3", Tier::Approaching, Tier::Mastered));
        assert!(!banks.move_tier("addition:9:9", Tier::Emerging, Tier::Mastered));
        assert_eq!(banks.locate("addition:2:3"), Some(Tier::Emerging));

        assert!(banks.move_tier("addition:2:3", Tier::Emerging, Tier::Approaching));
        let moved = banks.get("addition:2:3").unwrap();
        assert_eq!(moved.proficiency_level, Tier::Approaching);
    }

    #[test]
    fn test_insertion_order_within_tier() {
        let mut banks = ProblemBanks::default();
        banks.upsert(progress(3, 0), Tier::Mastered);
        banks.upsert(progress(1, 0), Tier::Mastered);
        banks.upsert(progress(2, 0), Tier::Mastered);
        let ids: Vec<&str> = banks.tier(Tier::Mastered).iter().map(|p| p.problem_id()).collect();
        assert_eq!(ids, vec!["addition:3:0", "addition:1:0", "addition:2:0"]);
    }

    #[test]
    fn test_deserialize_collapses_legacy_duplicates() {
        let entry = serde_json::to_value(progress(4, 4)).unwrap();
        let doc = serde_json::json!({
            "doesNotKnow": [entry.clone()],
            "mastered": [entry.clone(), entry],
        });
        let banks: ProblemBanks = serde_json::from_value(doc).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks.locate("addition:4:4"), Some(Tier::Mastered));
    }

    #[test]
    fn test_serde_roundtrip_preserves_entries() {
        let mut banks = ProblemBanks::default();
        banks.upsert(progress(1, 2), Tier::Approaching);
        banks.upsert(progress(5, 2), Tier::DoesNotKnow);
        let json = serde_json::to_string(&banks).unwrap();
        let back: ProblemBanks = serde_json::from_str(&json).unwrap();
        assert_eq!(back, banks);
    }
}
