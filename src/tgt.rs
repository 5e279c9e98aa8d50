/*
 * The copyright in this software is being made available under the 2-clauses
 * BSD License, included below. This software may be subject to other third
 * party and contributor rights, including patent rights, and no such rights
 * are granted under this license.
 *
 * Copyright (c) 2002-2014, Universite catholique de Louvain (UCL), Belgium
 * Copyright (c) 2002-2014, Professor Benoit Macq
 * Copyright (c) 2001-2003, David Janssens
 * Copyright (c) 2002-2003, Yannick Verschueren
 * Copyright (c) 2003-2007, Francois-Olivier Devaux
 * Copyright (c) 2003-2014, Antonin Descampe
 * Copyright (c) 2005, Herve Drolon, FreeImage Team
 * Copyright (c) 2008, 2011-2012, Centre National d'Etudes Spatiales (CNES), FR
 * Copyright (c) 2012, CS Systemes d'Information, France
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions
 * are met:
 * 1. Redistributions of source code must retain the above copyright
 *    notice, this list of conditions and the following disclaimer.
 * 2. Redistributions in binary form must reproduce the above copyright
 *    notice, this list of conditions and the following disclaimer in the
 *    documentation and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS `AS IS'
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
 * ARE DISCLAIMED.  IN NO EVENT SHALL THE COPYRIGHT OWNER OR CONTRIBUTORS BE
 * LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR
 * CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF
 * SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS
 * INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN
 * CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

//! Tag-tree coder (spec section 4.2): a quad-merging tree over an MxN grid of leaves where each
//! internal node's value is the minimum of its children. Two instances are owned per precinct
//! (spec section 3): the inclusion tree and the zero-bit-planes tree.
//!
//! The teacher's `tgt.rs` builds this as a flat array of `opj_tgt_node_t` linked by raw
//! `*mut` parent pointers allocated with `opj_calloc_type_array`. Per spec section 9's "cyclic
//! ownership" design note, nodes are stored here as a `Vec<Node>` addressed by `u32` index, with
//! `parent: Option<u32>` instead of a pointer.

use crate::bio::{BitReader, BitWriter};
use crate::error::Result;

const UNKNOWN: i32 = i32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Option<u32>,
    /// Running lower bound communicated to the decoder/encoder so far.
    low: i32,
    /// The leaf/node's true value once known (`UNKNOWN` until then).
    value: i32,
    known: bool,
}

/// A tag tree over a 2-D grid of leaves (spec section 4.2).
#[derive(Debug, Clone)]
pub struct TagTree {
    leafs_h: u32,
    leafs_v: u32,
    /// Flattened per-level storage: level 0 holds `leafs_h * leafs_v` leaves, level k holds the
    /// quad-merge of level k-1, down to a single root.
    levels: Vec<LevelInfo>,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct LevelInfo {
    w: u32,
    h: u32,
    /// Index of this level's first node within `nodes`.
    offset: u32,
}

impl TagTree {
    /// Builds a tag tree over `leafs_h x leafs_v` leaves, all node values initially unknown.
    pub fn new(leafs_h: u32, leafs_v: u32) -> Self {
        let leafs_h = leafs_h.max(1);
        let leafs_v = leafs_v.max(1);
        let mut levels = Vec::new();
        let mut total = 0u32;
        let (mut w, mut h) = (leafs_h, leafs_v);
        loop {
            levels.push(LevelInfo {
                w,
                h,
                offset: total,
            });
            total += w * h;
            if w <= 1 && h <= 1 {
                break;
            }
            w = (w + 1) / 2;
            h = (h + 1) / 2;
        }
        let nodes = vec![
            Node {
                parent: None,
                low: 0,
                value: UNKNOWN,
                known: false,
            };
            total as usize
        ];
        let mut tree = TagTree {
            leafs_h,
            leafs_v,
            levels,
            nodes,
        };
        tree.link_parents();
        tree
    }

    fn link_parents(&mut self) {
        for lvl in 0..self.levels.len().saturating_sub(1) {
            let cur = self.levels[lvl];
            let parent = self.levels[lvl + 1];
            for y in 0..cur.h {
                for x in 0..cur.w {
                    let idx = cur.offset + y * cur.w + x;
                    let pidx = parent.offset + (y / 2) * parent.w + (x / 2);
                    self.nodes[idx as usize].parent = Some(pidx);
                }
            }
        }
    }

    fn leaf_index(&self, leaf_x: u32, leaf_y: u32) -> u32 {
        self.levels[0].offset + leaf_y * self.levels[0].w + leaf_x
    }

    /// Resets every node to the unknown/zero-low state, for reuse across precincts.
    pub fn reset(&mut self) {
        for n in self.nodes.iter_mut() {
            n.low = 0;
            n.value = UNKNOWN;
            n.known = false;
        }
    }

    /// Sets a leaf's true value before encoding (the encoder always knows every leaf value up
    /// front, unlike the decoder).
    pub fn set_leaf_value(&mut self, leaf_x: u32, leaf_y: u32, value: i32) {
        let mut idx = self.leaf_index(leaf_x, leaf_y);
        loop {
            let v = self.nodes[idx as usize].value;
            if v == UNKNOWN || value < v {
                self.nodes[idx as usize].value = value;
            }
            match self.nodes[idx as usize].parent {
                Some(p) => idx = p,
                None => break,
            }
        }
    }

    /// After all leaves are set, propagate true min values root-ward so ancestor nodes are
    /// correct even for leaves that were not the minimum contributor at every level.
    fn finalize_values(&mut self) {
        for lvl in 0..self.levels.len().saturating_sub(1) {
            let cur = self.levels[lvl];
            for y in 0..cur.h {
                for x in 0..cur.w {
                    let idx = (cur.offset + y * cur.w + x) as usize;
                    let v = self.nodes[idx].value;
                    if let Some(p) = self.nodes[idx].parent {
                        let pv = self.nodes[p as usize].value;
                        if pv == UNKNOWN || v < pv {
                            self.nodes[p as usize].value = v;
                        }
                    }
                }
            }
        }
    }

    /// Encodes "is `leaf.value < threshold`" for one leaf, walking root-to-leaf and emitting the
    /// comma-coded path exactly as spec section 4.2 describes: for each node, emit
    /// `(t - node.low)` zero-bits while `node.low < min(t, node.value)`, then a one-bit once
    /// `t > node.value`.
    pub fn encode(&mut self, leaf_x: u32, leaf_y: u32, threshold: i32, out: &mut BitWriter) {
        self.finalize_values();
        let leaf_idx = self.leaf_index(leaf_x, leaf_y);
        let mut path = Vec::new();
        let mut idx = Some(leaf_idx);
        while let Some(i) = idx {
            path.push(i);
            idx = self.nodes[i as usize].parent;
        }
        for &idx in path.iter().rev() {
            let node = &mut self.nodes[idx as usize];
            if node.known {
                continue;
            }
            let bound = threshold.min(node.value);
            while node.low < bound {
                out.write_bit(0);
                node.low += 1;
            }
            if threshold > node.value {
                node.known = true;
                out.write_bit(1);
            } else {
                out.write_bit(0);
            }
        }
    }

    /// Decodes whether `leaf.value < threshold`, returning `true` once the leaf's true value
    /// has been fully discovered (value stored is accessible via `leaf_value`).
    pub fn decode(
        &mut self,
        leaf_x: u32,
        leaf_y: u32,
        threshold: i32,
        input: &mut BitReader,
    ) -> Result<bool> {
        let leaf_idx = self.leaf_index(leaf_x, leaf_y);
        let mut path = Vec::new();
        let mut idx = Some(leaf_idx);
        while let Some(i) = idx {
            path.push(i);
            idx = self.nodes[i as usize].parent;
        }
        let mut known_value = true;
        for &idx in path.iter().rev() {
            let node = &mut self.nodes[idx as usize];
            if node.known {
                continue;
            }
            while !node.known && node.low < threshold {
                let bit = input.read_bit()?;
                if bit == 1 {
                    node.known = true;
                    node.value = node.low;
                } else {
                    node.low += 1;
                }
            }
            if !node.known {
                known_value = false;
                break;
            }
        }
        Ok(known_value && self.nodes[leaf_idx as usize].value < threshold)
    }

    /// The leaf's discovered value, once fully known from decoding.
    pub fn leaf_value(&self, leaf_x: u32, leaf_y: u32) -> Option<i32> {
        let idx = self.leaf_index(leaf_x, leaf_y) as usize;
        if self.nodes[idx].known {
            Some(self.nodes[idx].value)
        } else {
            None
        }
    }

    /// Testable invariant (spec section 8): for all n, `n.value >= n.parent.value`.
    pub fn check_monotonic(&self) -> bool {
        self.nodes.iter().all(|n| match n.parent {
            Some(p) => {
                let pv = self.nodes[p as usize].value;
                pv == UNKNOWN || n.value == UNKNOWN || pv <= n.value
            }
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_leaf() {
        let mut enc = TagTree::new(1, 1);
        enc.set_leaf_value(0, 0, 5);
        let mut w = BitWriter::new();
        enc.encode(0, 0, 100, &mut w);
        let bytes = w.finish();

        let mut dec = TagTree::new(1, 1);
        let mut r = BitReader::new(&bytes);
        let included = dec.decode(0, 0, 100, &mut r).unwrap();
        assert!(included);
        assert_eq!(dec.leaf_value(0, 0), Some(5));
    }

    #[test]
    fn round_trip_grid_various_thresholds() {
        let (w, h) = (5u32, 3u32);
        let values: Vec<i32> = (0..(w * h) as i32).map(|i| (i * 7) % 11).collect();
        let mut enc = TagTree::new(w, h);
        for y in 0..h {
            for x in 0..w {
                enc.set_leaf_value(x, y, values[(y * w + x) as usize]);
            }
        }
        let mut writer = BitWriter::new();
        for y in 0..h {
            for x in 0..w {
                enc.encode(x, y, 12, &mut writer);
            }
        }
        let bytes = writer.finish();

        let mut dec = TagTree::new(w, h);
        let mut reader = BitReader::new(&bytes);
        for y in 0..h {
            for x in 0..w {
                let included = dec.decode(x, y, 12, &mut reader).unwrap();
                let expected = values[(y * w + x) as usize];
                assert_eq!(included, expected < 12);
                assert_eq!(dec.leaf_value(x, y), Some(expected));
            }
        }
        assert!(dec.check_monotonic());
    }

    #[test]
    fn monotonic_invariant_holds_after_encode() {
        let mut enc = TagTree::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                enc.set_leaf_value(x, y, ((x + 1) * (y + 1)) as i32);
            }
        }
        enc.finalize_values();
        assert!(enc.check_monotonic());
    }
}
