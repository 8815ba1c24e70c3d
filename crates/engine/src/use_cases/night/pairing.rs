use dollhouse_domain::{NpcId, NpcPlan};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct PairCandidate {
    pub npc_id: NpcId,
    pub name: String,
    pub plan: Option<NpcPlan>,
}

impl PairCandidate {
    fn is_mentioned_by(&self, plan: &NpcPlan) -> bool {
        plan.mentions(self.npc_id.as_str()) || plan.mentions(&self.name)
    }
}

/// Choose who talks to whom tonight.
///
/// Candidates are walked in the given order; an NPC whose plan names a free NPC is paired
/// with it first and speaks first. Everyone left over is shuffled with `seed` and paired
/// off. At most `max_pairs` pairs are returned, plan-driven pairs ahead of random ones.
pub fn select_pairs(candidates: &[PairCandidate], seed: u64, max_pairs: usize) -> Vec<(NpcId, NpcId)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut taken = vec![false; candidates.len()];
    let mut pairs = Vec::new();

    for (i, candidate) in candidates.iter().enumerate() {
        if taken[i] {
            continue;
        }
        let Some(plan) = &candidate.plan else {
            continue;
        };
        let partner = candidates
            .iter()
            .enumerate()
            .find(|(j, other)| *j != i && !taken[*j] && other.is_mentioned_by(plan))
            .map(|(j, _)| j);
        if let Some(j) = partner {
            taken[i] = true;
            taken[j] = true;
            pairs.push((candidate.npc_id.clone(), candidates[j].npc_id.clone()));
        }
    }

    let mut rest: Vec<&PairCandidate> = candidates
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|(candidate, _)| candidate)
        .collect();
    rest.shuffle(&mut rng);
    pairs.extend(
        rest.chunks_exact(2)
            .map(|pair| (pair[0].npc_id.clone(), pair[1].npc_id.clone())),
    );

    pairs.truncate(max_pairs);
    pairs
}
