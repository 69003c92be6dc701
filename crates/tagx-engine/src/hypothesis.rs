//! Marker detection and the bounded hypothesis queue
//!
//! A hypothesis is one `(phase, marker variant, layer order, seed choice)`
//! combination. They are generated in rank order (phase, depth, cost,
//! preference) and generation stops at the cap, so the queue is finite
//! before the first decode and building it never walks the full space.

use serde::Serialize;
use std::collections::VecDeque;
use tagx_core::config::{MarkerSpec, MAX_LAYERS};
use tagx_core::{LayerMethod, Phase, Tag, TagProfile};

/// A marker variant that matched the tag header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedMarker {
    pub spec: MarkerSpec,
    /// Layer counts worth trying, ascending
    pub layer_counts: Vec<usize>,
    /// No count hint and more than one count to try
    pub ambiguous: bool,
}

/// Match `tag` against every marker variant of `profile`.
///
/// `Err` carries the reason nothing matched.
pub fn detect_markers(profile: &TagProfile, tag: &Tag) -> Result<Vec<DetectedMarker>, String> {
    let raw = tag.raw_bytes();
    let slot_count = profile.layers.len();
    let mut detected = Vec::new();
    let mut reasons = Vec::new();

    for spec in &profile.markers {
        if let Some(hint) = &tag.marker {
            if hint != &spec.name {
                continue;
            }
        }
        if raw.len() < spec.header_len {
            reasons.push(format!(
                "{}: tag is {} bytes, header needs {}",
                spec.name,
                raw.len(),
                spec.header_len
            ));
            continue;
        }
        if !spec.pattern.is_empty() {
            let end = spec.offset.saturating_add(spec.pattern.len());
            if raw.get(spec.offset..end) != Some(spec.pattern.as_slice()) {
                reasons.push(format!(
                    "{}: expected {} at offset {}",
                    spec.name,
                    hex::encode_upper(&spec.pattern),
                    spec.offset
                ));
                continue;
            }
        }

        let (layer_counts, ambiguous) = if let Some(n) = spec.layers {
            (vec![n], false)
        } else if let Some(at) = spec.layer_count_at {
            let n = usize::from(raw.get(at).copied().unwrap_or(0));
            if !(1..=MAX_LAYERS).contains(&n) {
                reasons.push(format!(
                    "{}: header layer count {n} outside 1..={MAX_LAYERS}",
                    spec.name
                ));
                continue;
            }
            (vec![n], false)
        } else {
            let max = profile.max_layers.min(slot_count).min(MAX_LAYERS);
            let counts: Vec<usize> = (1..=max).collect();
            let ambiguous = counts.len() > 1;
            (counts, ambiguous)
        };

        detected.push(DetectedMarker {
            spec: spec.clone(),
            layer_counts,
            ambiguous,
        });
    }

    if detected.is_empty() {
        if let Some(hint) = &tag.marker {
            if reasons.is_empty() {
                return Err(format!("marker hint '{hint}' names no variant of '{}'", profile.name));
            }
        }
        if reasons.is_empty() {
            reasons.push(format!("profile '{}' has no marker variants", profile.name));
        }
        return Err(reasons.join("; "));
    }
    Ok(detected)
}

/// One untried decryption guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hypothesis {
    pub phase: Phase,
    /// Index into the detected marker list
    #[serde(skip)]
    pub marker: usize,
    pub marker_name: String,
    /// `(layer slot, seed index)` in decode order
    pub chain: Vec<(usize, usize)>,
    pub methods: Vec<LayerMethod>,
    pub cost: u32,
    /// Inversions against the marker's preferred order; 0 is preferred
    pub preference: usize,
    /// Position in enumeration order, the final tie-break
    pub index: usize,
}

impl Hypothesis {
    /// Queue rank; smaller is tried first.
    pub fn priority(&self) -> (Phase, usize, u32, usize, usize) {
        (
            self.phase,
            self.chain.len(),
            self.cost,
            self.preference,
            self.index,
        )
    }
}

/// A layer order for one marker, before seeds are chosen.
struct ChainPlan {
    marker: usize,
    order: Vec<usize>,
    cost: u32,
    preference: usize,
}

/// Cheapest-first queue over a capped hypothesis set.
pub struct HypothesisQueue {
    pending: VecDeque<Hypothesis>,
    planned: usize,
}

impl HypothesisQueue {
    /// Generate hypotheses in priority order and stop at `limit`.
    ///
    /// `seed_counts[slot]` is how many seeds that layer slot offers for this
    /// tag. Work is bounded by the layer orders per depth plus `limit`, never
    /// by the full seed product. LATE hypotheses are only generated with
    /// `allow_late`.
    pub fn build(
        profile: &TagProfile,
        markers: &[DetectedMarker],
        seed_counts: &[usize],
        allow_late: bool,
        limit: usize,
    ) -> Self {
        let phases = Phase::ALL
            .into_iter()
            .filter(|p| allow_late || *p != Phase::Late);

        let mut pending = VecDeque::with_capacity(limit);
        'phases: for phase in phases {
            for depth in 1..=MAX_LAYERS {
                let plans = chain_plans(profile, markers, seed_counts, depth);
                for plan in plans {
                    let methods: Vec<LayerMethod> = plan
                        .order
                        .iter()
                        .map(|&s| profile.layers[s].method)
                        .collect();
                    let counts: Vec<usize> = plan.order.iter().map(|&s| seed_counts[s]).collect();
                    for seeds in SeedCombinations::new(&counts) {
                        if pending.len() >= limit {
                            break 'phases;
                        }
                        pending.push_back(Hypothesis {
                            phase,
                            marker: plan.marker,
                            marker_name: markers[plan.marker].spec.name.clone(),
                            chain: plan.order.iter().copied().zip(seeds).collect(),
                            methods: methods.clone(),
                            cost: plan.cost,
                            preference: plan.preference,
                            index: pending.len(),
                        });
                    }
                }
            }
        }

        let planned = pending.len();
        Self { pending, planned }
    }

    /// Number of hypotheses the queue started with.
    pub fn planned(&self) -> usize {
        self.planned
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Iterator for HypothesisQueue {
    type Item = Hypothesis;

    fn next(&mut self) -> Option<Hypothesis> {
        self.pending.pop_front()
    }
}

/// Layer orders of exactly `depth` slots across all markers, cheapest and
/// most preferred first. Ties keep marker then lexicographic order. Orders
/// through a slot with no seeds are dropped.
fn chain_plans(
    profile: &TagProfile,
    markers: &[DetectedMarker],
    seed_counts: &[usize],
    depth: usize,
) -> Vec<ChainPlan> {
    let mut plans = Vec::new();
    for (marker_idx, marker) in markers.iter().enumerate() {
        if !marker.layer_counts.contains(&depth) {
            continue;
        }
        let rank = preference_ranks(profile, &marker.spec);
        for order in ordered_selections(profile.layers.len(), depth) {
            if order.iter().any(|&s| seed_counts.get(s).copied().unwrap_or(0) == 0) {
                continue;
            }
            plans.push(ChainPlan {
                marker: marker_idx,
                cost: order.iter().map(|&s| profile.layers[s].method.cost()).sum(),
                preference: inversions(&order, &rank),
                order,
            });
        }
    }
    plans.sort_by_key(|p| (p.cost, p.preference));
    plans
}

/// Position of each layer slot in the marker's preferred order; unnamed
/// slots rank after all named ones.
fn preference_ranks(profile: &TagProfile, marker: &MarkerSpec) -> Vec<usize> {
    profile
        .layers
        .iter()
        .map(|layer| {
            marker
                .prefer_order
                .iter()
                .position(|name| name == &layer.name)
                .unwrap_or(marker.prefer_order.len())
        })
        .collect()
}

fn inversions(order: &[usize], rank: &[usize]) -> usize {
    let mut count = 0;
    for i in 0..order.len() {
        for j in i + 1..order.len() {
            if rank[order[i]] > rank[order[j]] {
                count += 1;
            }
        }
    }
    count
}

/// Every ordered selection of `k` distinct items from `0..n`, lexicographic.
fn ordered_selections(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn extend(n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in 0..n {
            if !current.contains(&i) {
                current.push(i);
                extend(n, k, current, out);
                current.pop();
            }
        }
    }

    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    extend(n, k, &mut Vec::with_capacity(k), &mut out);
    out
}

/// Cartesian product of `0..counts[i]`, first position varying slowest.
/// Lazy, so callers can stop long before the product is exhausted.
struct SeedCombinations {
    counts: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl SeedCombinations {
    fn new(counts: &[usize]) -> Self {
        let next = counts
            .iter()
            .all(|&n| n > 0)
            .then(|| vec![0; counts.len()]);
        Self {
            counts: counts.to_vec(),
            next,
        }
    }
}

impl Iterator for SeedCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for i in (0..succ.len()).rev() {
            succ[i] += 1;
            if succ[i] < self.counts[i] {
                self.next = Some(succ);
                return Some(current);
            }
            succ[i] = 0;
        }
        Some(current)
    }
}
