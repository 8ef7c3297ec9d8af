//! Compressed radix trie over stream ID strings.
//!
//! Edges carry byte-string labels and are kept sorted ascending by their first label byte, so
//! a depth-first walk enumerates leaves in lexicographic ID order. A node may carry both a
//! leaf and edges: that happens when one stored ID string is a proper prefix of a later one
//! (`5-1` then `5-10`), and the leaf always sorts before every descendant.

use crate::id::StreamId;

/// One `field -> value` pair of a stream entry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPair {
    /// Field name bytes.
    pub field: Vec<u8>,
    /// Field value bytes.
    pub value: Vec<u8>,
}

/// One stored stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) id: StreamId,
    pub(crate) fields: Vec<FieldPair>,
}

/// One entry produced by a range scan, in wire-ready form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMatch {
    /// Canonical `<ms>-<seq>` ID string.
    pub id: String,
    /// Entry payload in insertion order.
    pub fields: Vec<FieldPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct RadixNode {
    prefix: Vec<u8>,
    leaf: Option<Entry>,
    edges: Vec<RadixNode>,
}

impl RadixNode {
    fn new_leaf(prefix: Vec<u8>, entry: Entry) -> Self {
        Self {
            prefix,
            leaf: Some(entry),
            edges: Vec::new(),
        }
    }

    /// Inserts one entry under the remaining `search` suffix.
    pub(crate) fn insert(&mut self, search: &[u8], entry: Entry) {
        let Some(index) = self.child_index(search[0]) else {
            self.append_edge(Self::new_leaf(search.to_vec(), entry));
            return;
        };

        let common = common_prefix_len(&self.edges[index].prefix, search);
        if common == self.edges[index].prefix.len() {
            self.edges[index].insert(&search[common..], entry);
            return;
        }

        // Partial overlap with the edge label: split it behind an intermediate node.
        let mut existing = std::mem::take(&mut self.edges[index]);
        existing.prefix.drain(..common);
        let mut split = Self {
            prefix: search[..common].to_vec(),
            leaf: None,
            edges: Vec::new(),
        };
        split.append_edge(existing);
        split.append_edge(Self::new_leaf(search[common..].to_vec(), entry));
        self.edges[index] = split;
    }

    /// Collects leaves whose remaining path lies within the optional bounds, in order.
    ///
    /// Bounds are inclusive, expressed relative to the start of this node's label, and
    /// `None` means unbounded on that side.
    pub(crate) fn collect_between(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        out: &mut Vec<RangeMatch>,
    ) {
        if let Some(entry) = &self.leaf {
            let at_or_above_min = min.is_none_or(|bound| self.prefix.as_slice() >= bound);
            let at_or_below_max = max.is_none_or(|bound| self.prefix.as_slice() <= bound);
            if at_or_above_min && at_or_below_max {
                out.push(RangeMatch {
                    id: entry.id.to_string(),
                    fields: entry.fields.clone(),
                });
            }
            if !at_or_below_max {
                // Descendants extend this path and sort even higher.
                return;
            }
        }

        let next_min = match min {
            None => None,
            Some(bound) => {
                let shared = common_prefix_len(&self.prefix, bound);
                if shared == bound.len() {
                    None
                } else if shared < self.prefix.len() {
                    if self.prefix[shared] > bound[shared] {
                        None
                    } else {
                        // The whole subtree sorts below the lower bound.
                        return;
                    }
                } else {
                    Some(&bound[shared..])
                }
            }
        };
        let next_max = match max {
            None => None,
            Some(bound) => {
                let shared = common_prefix_len(&self.prefix, bound);
                if shared == bound.len() {
                    // Descendant paths extend strictly past the inclusive upper bound.
                    return;
                } else if shared < self.prefix.len() {
                    if self.prefix[shared] < bound[shared] {
                        None
                    } else {
                        return;
                    }
                } else {
                    Some(&bound[shared..])
                }
            }
        };

        for edge in &self.edges {
            let first = edge.prefix[0];
            if let Some(bound) = next_min
                && first < bound[0]
            {
                continue;
            }
            if let Some(bound) = next_max
                && first > bound[0]
            {
                break;
            }
            let edge_min = next_min.filter(|bound| bound[0] == first);
            let edge_max = next_max.filter(|bound| bound[0] == first);
            edge.collect_between(edge_min, edge_max, out);
        }
    }

    fn child_index(&self, first: u8) -> Option<usize> {
        self.edges.iter().position(|edge| edge.prefix[0] == first)
    }

    fn append_edge(&mut self, edge: RadixNode) {
        let position = self
            .edges
            .iter()
            .position(|existing| existing.prefix[0] > edge.prefix[0])
            .unwrap_or(self.edges.len());
        self.edges.insert(position, edge);
    }
}

fn common_prefix_len(left: &[u8], right: &[u8]) -> usize {
    left.iter()
        .zip(right.iter())
        .take_while(|(a, b)| a == b)
        .count()
}
