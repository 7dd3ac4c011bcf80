//! Channel adjacency graph for spatio-temporal clustering
//!
//! Encodes which channels count as spatial neighbors so clusters can extend
//! across sensors, not just across time. Time adjacency is implicit (sample
//! i touches i-1 and i+1) and handled by the clusterer; this graph only
//! covers the channel dimension.
//!
//! Symmetry is enforced at construction: every inserted edge is stored in
//! both directions, so `are_adjacent(a, b) == are_adjacent(b, a)` holds for
//! all pairs. Channels without any neighbor stay in the graph as isolated
//! nodes rather than being dropped.

use crate::error::{ClusterStatsError, Result};
use std::collections::HashMap;

/// How to treat neighbor-criterion entries that name channels absent from
/// the channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMatching {
    /// Unknown channel names fail construction.
    #[default]
    Strict,
    /// Unknown channel names are skipped; the named channels simply end up
    /// isolated.
    Permissive,
}

/// Symmetric channel neighborhood structure. Immutable after construction.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph {
    names: Vec<String>,
    neighbors: Vec<Vec<usize>>,
}

impl AdjacencyGraph {
    /// Build from explicit neighbor pairs given as channel names.
    ///
    /// Self-pairs are ignored and duplicate pairs are deduplicated. In
    /// strict matching mode a pair naming an unknown channel fails with a
    /// configuration error; in permissive mode it is skipped.
    pub fn from_neighbor_pairs<S: AsRef<str>>(
        channels: &[S],
        pairs: &[(S, S)],
        matching: ChannelMatching,
    ) -> Result<Self> {
        let names = Self::collect_names(channels)?;
        let index: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut neighbors = vec![Vec::new(); names.len()];
        for (a, b) in pairs {
            let (a, b) = (a.as_ref(), b.as_ref());
            let (ia, ib) = match (index.get(a), index.get(b)) {
                (Some(&ia), Some(&ib)) => (ia, ib),
                (missing_a, _) if matching == ChannelMatching::Strict => {
                    let name = if missing_a.is_none() { a } else { b };
                    return Err(ClusterStatsError::UnknownChannel {
                        name: name.to_string(),
                    });
                }
                _ => continue,
            };
            if ia == ib {
                continue;
            }
            neighbors[ia].push(ib);
            neighbors[ib].push(ia);
        }

        Ok(Self::finish(names, neighbors))
    }

    /// Build from sensor positions: channels within `radius` of each other
    /// (Euclidean distance, exclusive of self) become neighbors.
    pub fn from_positions<S: AsRef<str>>(
        channels: &[S],
        positions: &[[f32; 3]],
        radius: f32,
    ) -> Result<Self> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(ClusterStatsError::InvalidRadius { radius });
        }
        let names = Self::collect_names(channels)?;
        if positions.len() != names.len() {
            return Err(ClusterStatsError::PositionCountMismatch {
                names: names.len(),
                positions: positions.len(),
            });
        }

        let r2 = radius * radius;
        let mut neighbors = vec![Vec::new(); names.len()];
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let d2: f32 = positions[i]
                    .iter()
                    .zip(positions[j].iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if d2 <= r2 {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }

        Ok(Self::finish(names, neighbors))
    }

    /// Complete graph: every channel neighbors every other channel.
    pub fn complete(n_channels: usize) -> Self {
        let names = (0..n_channels).map(|i| format!("ch{i}")).collect();
        let neighbors = (0..n_channels)
            .map(|i| (0..n_channels).filter(|&j| j != i).collect())
            .collect();
        Self { names, neighbors }
    }

    /// Ring graph: channel i neighbors i-1 and i+1, wrapping at the ends.
    pub fn ring(n_channels: usize) -> Self {
        let names = (0..n_channels).map(|i| format!("ch{i}")).collect();
        let neighbors = (0..n_channels)
            .map(|i| {
                if n_channels < 2 {
                    Vec::new()
                } else if n_channels == 2 {
                    vec![1 - i]
                } else {
                    let mut v = vec![(i + n_channels - 1) % n_channels, (i + 1) % n_channels];
                    v.sort_unstable();
                    v
                }
            })
            .collect();
        Self { names, neighbors }
    }

    /// Graph with no edges at all: clustering degenerates to per-channel
    /// runs along the time axis.
    pub fn isolated(n_channels: usize) -> Self {
        Self {
            names: (0..n_channels).map(|i| format!("ch{i}")).collect(),
            neighbors: vec![Vec::new(); n_channels],
        }
    }

    pub fn n_channels(&self) -> usize {
        self.names.len()
    }

    pub fn channel_names(&self) -> &[String] {
        &self.names
    }

    /// Neighbor indices of a channel, sorted ascending. Out-of-range
    /// channels have no neighbors.
    pub fn neighbors(&self, channel: usize) -> &[usize] {
        self.neighbors
            .get(channel)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Total number of undirected edges.
    pub fn n_edges(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }

    fn collect_names<S: AsRef<str>>(channels: &[S]) -> Result<Vec<String>> {
        let mut seen = HashMap::new();
        let mut names = Vec::with_capacity(channels.len());
        for ch in channels {
            let name = ch.as_ref().to_string();
            if seen.insert(name.clone(), ()).is_some() {
                return Err(ClusterStatsError::DuplicateChannel { name });
            }
            names.push(name);
        }
        Ok(names)
    }

    fn finish(names: Vec<String>, mut neighbors: Vec<Vec<usize>>) -> Self {
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        Self { names, neighbors }
    }
}
