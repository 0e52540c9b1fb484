//! Graph analytics: centrality scoring and community detection.
//!
//! Both algorithms treat the relationship list as an undirected,
//! unweighted graph. Narrative graphs are small (hundreds of entities),
//! so the implementations favor clarity over asymptotic cleverness.

use super::KnowledgeGraph;
use crate::models::EntityId;
use std::collections::{HashMap, HashSet};

/// Damping factor for the centrality power iteration.
const DAMPING: f64 = 0.85;
/// Hard cap on power iterations.
const MAX_ITERATIONS: usize = 100;
/// Convergence threshold on the summed score delta.
const EPSILON: f64 = 1e-6;

/// A detected community of entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    /// Ordinal label, assigned largest community first.
    pub id: usize,
    /// Member entity ids, sorted.
    pub members: Vec<EntityId>,
}

impl KnowledgeGraph {
    /// Ranks entities by damped eigenvector centrality.
    ///
    /// Runs a power iteration over the undirected adjacency with a
    /// damping factor of 0.85, capped at 100 iterations or until the
    /// total score movement drops below epsilon. Isolated entities keep
    /// the baseline score. Returns the `top_n` highest-scored entities,
    /// descending.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn central_entities(&self, top_n: usize) -> Vec<(EntityId, f64)> {
        let node_count = self.entity_count();
        if node_count == 0 || top_n == 0 {
            return Vec::new();
        }

        let adjacency = self.adjacency(None);
        let degrees: HashMap<&EntityId, usize> = adjacency
            .iter()
            .map(|(id, neighbors)| (*id, neighbors.len()))
            .collect();

        let n = node_count as f64;
        let baseline = (1.0 - DAMPING) / n;
        let mut scores: HashMap<&EntityId, f64> =
            self.entities().map(|e| (&e.id, 1.0 / n)).collect();

        for _ in 0..MAX_ITERATIONS {
            let mut next: HashMap<&EntityId, f64> =
                scores.keys().map(|&id| (id, baseline)).collect();

            for (&id, neighbors) in &adjacency {
                let degree = degrees.get(&id).copied().unwrap_or(0);
                if degree == 0 {
                    continue;
                }
                let share = DAMPING * scores.get(&id).copied().unwrap_or(0.0) / degree as f64;
                for &neighbor in neighbors {
                    if let Some(score) = next.get_mut(&neighbor) {
                        *score += share;
                    }
                }
            }

            let delta: f64 = next
                .iter()
                .map(|(id, score)| (score - scores.get(*id).copied().unwrap_or(0.0)).abs())
                .sum();
            scores = next;
            if delta < EPSILON {
                break;
            }
        }

        let mut ranked: Vec<(EntityId, f64)> = scores
            .into_iter()
            .map(|(id, score)| (id.clone(), score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(top_n);
        ranked
    }

    /// Detects communities by greedy modularity maximization.
    ///
    /// Starts from singleton clusters and repeatedly merges the pair of
    /// connected clusters with the largest positive modularity gain,
    /// stopping when no merge improves modularity. Isolated entities end
    /// up as singleton communities. Communities are returned largest
    /// first.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect_communities(&self) -> Vec<Community> {
        let nodes: Vec<&EntityId> = {
            let mut ids: Vec<&EntityId> = self.entities().map(|e| &e.id).collect();
            ids.sort();
            ids
        };
        if nodes.is_empty() {
            return Vec::new();
        }
        let index: HashMap<&EntityId, usize> =
            nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        // Undirected edge set, self-loops and duplicates collapsed.
        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for rel in self.relationships() {
            if let (Some(&a), Some(&b)) = (index.get(&rel.source_id), index.get(&rel.target_id)) {
                if a != b {
                    edges.insert((a.min(b), a.max(b)));
                }
            }
        }

        let mut cluster: Vec<usize> = (0..nodes.len()).collect();
        if !edges.is_empty() {
            let m = edges.len() as f64;
            let mut degree = vec![0usize; nodes.len()];
            for &(a, b) in &edges {
                degree[a] += 1;
                degree[b] += 1;
            }

            loop {
                // Edge counts and total degree per current cluster pair.
                let mut between: HashMap<(usize, usize), f64> = HashMap::new();
                let mut cluster_degree: HashMap<usize, f64> = HashMap::new();
                for (node, &deg) in degree.iter().enumerate() {
                    *cluster_degree.entry(cluster[node]).or_default() += deg as f64;
                }
                for &(a, b) in &edges {
                    let (ca, cb) = (cluster[a], cluster[b]);
                    if ca != cb {
                        *between.entry((ca.min(cb), ca.max(cb))).or_default() += 1.0;
                    }
                }

                let best = between
                    .iter()
                    .map(|(&(ca, cb), &e_ab)| {
                        let d_a = cluster_degree.get(&ca).copied().unwrap_or(0.0);
                        let d_b = cluster_degree.get(&cb).copied().unwrap_or(0.0);
                        let gain = e_ab / m - (d_a * d_b) / (2.0 * m * m);
                        ((ca, cb), gain)
                    })
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

                match best {
                    Some(((ca, cb), gain)) if gain > 0.0 => {
                        for label in &mut cluster {
                            if *label == cb {
                                *label = ca;
                            }
                        }
                    },
                    _ => break,
                }
            }
        }

        let mut grouped: HashMap<usize, Vec<EntityId>> = HashMap::new();
        for (node, &label) in cluster.iter().enumerate() {
            grouped.entry(label).or_default().push(nodes[node].clone());
        }
        let mut communities: Vec<Vec<EntityId>> = grouped.into_values().collect();
        for members in &mut communities {
            members.sort();
        }
        communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        communities
            .into_iter()
            .enumerate()
            .map(|(id, members)| Community { id, members })
            .collect()
    }
}
