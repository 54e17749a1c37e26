//! Candidate search and sub-network resolution.
//!
//! Linking one frame to the next is a bipartite assignment between live tracks
//! (sources) and the particles of the new frame (destinations). Candidate edges only
//! exist within the search range, so the assignment splits into small independent
//! components. Unambiguous components link directly. The rest (sub-networks) are
//! solved exactly by a bounded depth-first search.

use std::collections::HashMap;

use log::warn;

use crate::error::{LinkError, Result};
use crate::structure::Position;

/// A destination reachable from a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub dest: usize,
    pub dist: f64,
}

/// Uniform grid hash over destination positions.
///
/// The cell size equals the search radius, so every point within the radius of a
/// query lies in the query's cell or one of its direct neighbours.
pub struct GridIndex<'a> {
    points: &'a [Position],
    cell: f64,
    cells: HashMap<Vec<i64>, Vec<usize>>,
}

impl<'a> GridIndex<'a> {
    pub fn new(points: &'a [Position], cell: f64) -> Self {
        let mut cells: HashMap<Vec<i64>, Vec<usize>> = HashMap::new();
        for (idx, point) in points.iter().enumerate() {
            cells.entry(cell_key(point, cell)).or_default().push(idx);
        }
        Self {
            points,
            cell,
            cells,
        }
    }

    /// Points strictly closer than `radius` to `query`, nearest first.
    /// `radius` must not exceed the cell size.
    pub fn within(&self, query: &Position, radius: f64) -> Vec<Candidate> {
        let center = cell_key(query, self.cell);
        let mut found = Vec::new();
        let mut key = center.clone();
        self.visit_neighbours(&center, &mut key, 0, &mut |indices: &[usize]| {
            for &idx in indices {
                let dist = self.points[idx].distance_to(query);
                if dist < radius {
                    found.push(Candidate { dest: idx, dist });
                }
            }
        });
        sort_candidates(&mut found);
        found
    }

    fn visit_neighbours(
        &self,
        center: &[i64],
        key: &mut Vec<i64>,
        axis: usize,
        visit: &mut dyn FnMut(&[usize]),
    ) {
        if axis == center.len() {
            if let Some(indices) = self.cells.get(key.as_slice()) {
                visit(indices);
            }
            return;
        }
        for offset in -1..=1 {
            // Keys saturate far from the origin; skip neighbours past the edge
            let Some(k) = center[axis].checked_add(offset) else {
                continue;
            };
            key[axis] = k;
            self.visit_neighbours(center, key, axis + 1, visit);
        }
    }
}

fn cell_key(point: &Position, cell: f64) -> Vec<i64> {
    point
        .coords()
        .iter()
        .map(|c| (c / cell).floor() as i64)
        .collect()
}

fn sort_candidates(cands: &mut [Candidate]) {
    cands.sort_by(|a, b| a.dist.total_cmp(&b.dist).then(a.dest.cmp(&b.dest)));
}

/// Limits applied while resolving a frame
#[derive(Debug, Clone, Copy)]
pub struct SubnetLimits {
    pub search_range: f64,
    pub max_subnet_size: usize,
    pub adaptive_stop: Option<f64>,
    pub adaptive_step: f64,
}

/// A connected component of the candidate graph
#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub sources: Vec<usize>,
    pub dests: Vec<usize>,
}

/// Split `sources` into connected components, keeping only edges shorter than `limit`.
/// Sources without any such edge are left out.
pub fn split_subnets(sources: &[usize], cands: &[Vec<Candidate>], limit: f64) -> Vec<Subnet> {
    let mut dest_nodes: HashMap<usize, usize> = HashMap::new();
    let mut dest_ids: Vec<usize> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    for (local, &src) in sources.iter().enumerate() {
        for cand in cands[src].iter().filter(|c| c.dist < limit) {
            let node = *dest_nodes.entry(cand.dest).or_insert_with(|| {
                dest_ids.push(cand.dest);
                sources.len() + dest_ids.len() - 1
            });
            edges.push((local, node));
        }
    }

    let mut sets = DisjointSet::new(sources.len() + dest_ids.len());
    for &(a, b) in &edges {
        sets.union(a, b);
    }

    let mut by_root: HashMap<usize, usize> = HashMap::new();
    let mut subnets: Vec<Subnet> = Vec::new();
    for &(src_node, _) in &edges {
        let root = sets.find(src_node);
        if !by_root.contains_key(&root) {
            by_root.insert(root, subnets.len());
            subnets.push(Subnet {
                sources: Vec::new(),
                dests: Vec::new(),
            });
        }
    }
    for (local, &src) in sources.iter().enumerate() {
        if let Some(&slot) = by_root.get(&sets.find(local)) {
            subnets[slot].sources.push(src);
        }
    }
    for (offset, &dest) in dest_ids.iter().enumerate() {
        let root = sets.find(sources.len() + offset);
        if let Some(&slot) = by_root.get(&root) {
            subnets[slot].dests.push(dest);
        }
    }
    for subnet in &mut subnets {
        subnet.dests.sort_unstable();
    }
    subnets
}

/// Decide the links of one frame.
///
/// `cands[s]` lists the destinations reachable from source `s`. Returns
/// `(source, destination)` pairs sorted by source. Sources absent from the result
/// stay unlinked and destinations absent from it start new tracks.
pub fn resolve_links(
    cands: &[Vec<Candidate>],
    frame: i64,
    limits: &SubnetLimits,
) -> Result<Vec<(usize, usize)>> {
    let sources: Vec<usize> = (0..cands.len()).collect();
    let mut links = Vec::new();
    for subnet in split_subnets(&sources, cands, limits.search_range) {
        resolve_subnet(&subnet, cands, limits.search_range, frame, limits, &mut links)?;
    }
    links.sort_unstable();
    Ok(links)
}

fn resolve_subnet(
    subnet: &Subnet,
    cands: &[Vec<Candidate>],
    range: f64,
    frame: i64,
    limits: &SubnetLimits,
    links: &mut Vec<(usize, usize)>,
) -> Result<()> {
    if subnet.sources.len() == 1 && subnet.dests.len() == 1 {
        links.push((subnet.sources[0], subnet.dests[0]));
        return Ok(());
    }

    if subnet.sources.len() <= limits.max_subnet_size {
        links.extend(solve_subnet(subnet, cands, range));
        return Ok(());
    }

    let oversize = || LinkError::SubnetOversize {
        frame,
        size: subnet.sources.len(),
        max: limits.max_subnet_size,
    };
    let stop = limits.adaptive_stop.ok_or_else(oversize)?;
    let reduced = range * limits.adaptive_step;
    if reduced < stop {
        return Err(oversize());
    }
    warn!(
        "Frame {}: subnetwork of {} points, retrying with search range {:.4}",
        frame,
        subnet.sources.len(),
        reduced
    );
    for piece in split_subnets(&subnet.sources, cands, reduced) {
        resolve_subnet(&piece, cands, reduced, frame, limits, links)?;
    }
    Ok(())
}

/// Exact minimum-cost assignment inside one sub-network.
///
/// A link costs its squared length. Leaving a source unlinked costs `range²`.
/// Among equally good assignments the first one found is kept.
pub fn solve_subnet(subnet: &Subnet, cands: &[Vec<Candidate>], range: f64) -> Vec<(usize, usize)> {
    let null_cost = range * range;
    let dest_slot: HashMap<usize, usize> = subnet
        .dests
        .iter()
        .enumerate()
        .map(|(slot, &dest)| (dest, slot))
        .collect();

    let options: Vec<Vec<(usize, f64)>> = subnet
        .sources
        .iter()
        .map(|&src| {
            cands[src]
                .iter()
                .filter(|c| c.dist < range)
                .filter_map(|c| dest_slot.get(&c.dest).map(|&slot| (slot, c.dist * c.dist)))
                .collect()
        })
        .collect();

    // Lower bound on the cost of sources i.. used for pruning
    let mut remaining_min = vec![0.0; options.len() + 1];
    for i in (0..options.len()).rev() {
        let cheapest = options[i]
            .iter()
            .map(|&(_, cost)| cost)
            .fold(null_cost, f64::min);
        remaining_min[i] = remaining_min[i + 1] + cheapest;
    }

    let mut search = SubnetSearch {
        options: &options,
        remaining_min: &remaining_min,
        null_cost,
        taken: vec![false; subnet.dests.len()],
        current: vec![None; options.len()],
        best: vec![None; options.len()],
        best_cost: f64::INFINITY,
    };
    search.descend(0, 0.0);

    subnet
        .sources
        .iter()
        .zip(search.best.iter())
        .filter_map(|(&src, choice)| choice.map(|slot| (src, subnet.dests[slot])))
        .collect()
}

struct SubnetSearch<'a> {
    options: &'a [Vec<(usize, f64)>],
    remaining_min: &'a [f64],
    null_cost: f64,
    taken: Vec<bool>,
    current: Vec<Option<usize>>,
    best: Vec<Option<usize>>,
    best_cost: f64,
}

impl SubnetSearch<'_> {
    fn descend(&mut self, idx: usize, cost: f64) {
        if cost + self.remaining_min[idx] >= self.best_cost {
            return;
        }
        if idx == self.options.len() {
            self.best_cost = cost;
            self.best.clone_from(&self.current);
            return;
        }
        let options = self.options;
        for &(slot, link_cost) in &options[idx] {
            if self.taken[slot] {
                continue;
            }
            self.taken[slot] = true;
            self.current[idx] = Some(slot);
            self.descend(idx + 1, cost + link_cost);
            self.taken[slot] = false;
        }
        self.current[idx] = None;
        self.descend(idx + 1, cost + self.null_cost);
    }
}

/// Union-find over component nodes
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
