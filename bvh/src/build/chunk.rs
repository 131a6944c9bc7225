use rayon::prelude::*;

use crate::build::statistics::BuildStatistics;
use crate::{Aabb, BuildError, BvhNode, Result};

/// Right child reference of a node while it still lives in a chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ChildRef {
    /// Index into the same chunk.
    Local(u32),
    /// Root of another chunk, built by a separate task.
    Chunk(u32),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum ChunkNodeKind {
    Interior { left: u32, right: ChildRef },
    Leaf { begin: u32, end: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct ChunkNode {
    pub bounds: Aabb,
    pub kind: ChunkNodeKind,
    pub depth: u32,
}

/// Nodes produced by one task. Slots are reserved before they are filled so
/// a parent can reference its children while they are being built.
#[derive(Debug)]
pub(crate) struct ResultChunk {
    id: u32,
    nodes: Vec<Option<ChunkNode>>,
}

impl ResultChunk {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn alloc(&mut self) -> Result<u32> {
        if self.nodes.len() >= u32::MAX as usize {
            return Err(BuildError::TooManyObjects(self.nodes.len()));
        }
        self.nodes.try_reserve(1).map_err(|_| BuildError::OutOfMemory {
            what: "result chunk",
            count: self.nodes.len() + 1,
        })?;
        self.nodes.push(None);
        Ok((self.nodes.len() - 1) as u32)
    }

    pub fn write(&mut self, index: u32, node: ChunkNode) {
        let slot = &mut self.nodes[index as usize];
        debug_assert!(slot.is_none(), "node {} of chunk {} written twice", index, self.id);
        *slot = Some(node);
    }
}

/// What a finished task hands back to the driver.
#[derive(Debug)]
pub(crate) struct ChunkReport {
    pub chunk: ResultChunk,
    pub stats: BuildStatistics,
}

/// Concatenates all chunks into one node array in chunk id order.
///
/// Local child indices are shifted by the chunk's final offset, references
/// to other chunks resolve to the offset of that chunk, whose root is its
/// first node. `chunks[i]` must be the chunk with id `i`.
pub(crate) fn merge_chunks(chunks: &[ResultChunk]) -> Result<Vec<BvhNode>> {
    let mut offsets = Vec::with_capacity(chunks.len());
    let mut total = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.id as usize != i {
            return Err(BuildError::Internal(format!(
                "chunk {} found at position {}",
                chunk.id, i
            )));
        }
        offsets.push(total as u32);
        total += chunk.len();
    }
    if total > u32::MAX as usize {
        return Err(BuildError::TooManyObjects(total));
    }

    let placeholder = BvhNode::leaf(Aabb::EMPTY, 0, 0, 0);
    let mut nodes = Vec::new();
    nodes
        .try_reserve_exact(total)
        .map_err(|_| BuildError::OutOfMemory {
            what: "node array",
            count: total,
        })?;
    nodes.resize(total, placeholder);

    let mut targets = Vec::with_capacity(chunks.len());
    let mut rest = nodes.as_mut_slice();
    for chunk in chunks.iter() {
        let (target, tail) = std::mem::take(&mut rest).split_at_mut(chunk.len());
        targets.push(target);
        rest = tail;
    }

    let offsets = &offsets;
    chunks
        .par_iter()
        .zip(targets.into_par_iter())
        .try_for_each(|(chunk, target)| rebase(chunk, target, offsets))?;

    Ok(nodes)
}

fn rebase(chunk: &ResultChunk, target: &mut [BvhNode], offsets: &[u32]) -> Result<()> {
    let offset = offsets[chunk.id as usize];

    for (i, (slot, out)) in chunk.nodes.iter().zip(target.iter_mut()).enumerate() {
        let node = slot.ok_or_else(|| {
            BuildError::Internal(format!("node {} of chunk {} was never written", i, chunk.id))
        })?;

        *out = match node.kind {
            ChunkNodeKind::Leaf { begin, end } => BvhNode::leaf(node.bounds, begin, end, node.depth),
            ChunkNodeKind::Interior { left, right } => {
                let right = match right {
                    ChildRef::Local(r) => r + offset,
                    ChildRef::Chunk(id) => *offsets.get(id as usize).ok_or_else(|| {
                        BuildError::Internal(format!("reference to missing chunk {}", id))
                    })?,
                };
                BvhNode::interior(node.bounds, left + offset, right, node.depth)
            }
        };
    }

    Ok(())
}
