//! The ordering of instructions within a function.
//!
//! Grounded in `cranelift-codegen`'s `ir::layout::Layout`: a doubly linked
//! list of entity references plus BASIC-style sequence numbers ("10, 20,
//! 30, ...") that let range queries compare positions in O(1) without
//! renumbering on every insert. Unlike Cranelift's layout, there is no
//! block structure here — section 1 is explicit that the core "operates on
//! a flat, mutable instruction list" — so this is a single doubly linked
//! list, not a list-of-lists.

use super::entities::Inst;
use cranelift_entity::SecondaryMap;

type SequenceNumber = u64;

const MAJOR_STRIDE: SequenceNumber = 10;
const MINOR_STRIDE: SequenceNumber = 2;
const LOCAL_RENUMBER_LIMIT: SequenceNumber = MAJOR_STRIDE / MINOR_STRIDE - 1;

#[derive(Clone, Copy, Default)]
struct Node {
    prev: Option<Inst>,
    next: Option<Inst>,
    seq: SequenceNumber,
}

/// Doubly linked list of instructions with monotonically increasing
/// addresses suitable for relative range queries (section 3's Invariants:
/// "An instruction's address is >= that of its predecessor").
#[derive(Clone, Default)]
pub struct Layout {
    nodes: SecondaryMap<Inst, Node>,
    head: Option<Inst>,
    tail: Option<Inst>,
}

impl Layout {
    pub fn new() -> Self {
        Layout::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn head(&self) -> Option<Inst> {
        self.head
    }

    pub fn tail(&self) -> Option<Inst> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn prev(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].prev
    }

    pub fn next(&self, inst: Inst) -> Option<Inst> {
        self.nodes[inst].next
    }

    pub fn is_inserted(&self, inst: Inst) -> bool {
        self.head == Some(inst) || self.nodes[inst].prev.is_some() || self.nodes[inst].next.is_some()
    }

    /// Address used for range queries. Not a byte offset — just a total
    /// order consistent with program order, per section 3.
    pub fn seq(&self, inst: Inst) -> SequenceNumber {
        self.nodes[inst].seq
    }

    /// Closed-interval `a <= x <= b` test in program order.
    pub fn in_range(&self, x: Inst, a: Inst, b: Inst) -> bool {
        let (sx, sa, sb) = (self.seq(x), self.seq(a), self.seq(b));
        sa <= sx && sx <= sb
    }

    pub fn cmp(&self, a: Inst, b: Inst) -> std::cmp::Ordering {
        self.seq(a).cmp(&self.seq(b))
    }

    pub fn append(&mut self, inst: Inst) {
        match self.tail {
            None => {
                self.nodes[inst] = Node { prev: None, next: None, seq: MAJOR_STRIDE };
                self.head = Some(inst);
                self.tail = Some(inst);
            }
            Some(tail) => {
                let seq = self.nodes[tail].seq + MAJOR_STRIDE;
                self.nodes[inst] = Node { prev: Some(tail), next: None, seq };
                self.nodes[tail].next = Some(inst);
                self.tail = Some(inst);
            }
        }
    }

    /// Insert `inst` immediately before `before`.
    pub fn insert_before(&mut self, inst: Inst, before: Inst) {
        let prev = self.nodes[before].prev;
        let seq = self.new_seq_before(before);
        self.nodes[inst] = Node { prev, next: Some(before), seq };
        self.nodes[before].prev = Some(inst);
        match prev {
            Some(p) => self.nodes[p].next = Some(inst),
            None => self.head = Some(inst),
        }
    }

    /// Insert `inst` immediately after `after`.
    pub fn insert_after(&mut self, inst: Inst, after: Inst) {
        let next = self.nodes[after].next;
        let seq = self.new_seq_after(after);
        self.nodes[inst] = Node { prev: Some(after), next, seq };
        self.nodes[after].next = Some(inst);
        match next {
            Some(n) => self.nodes[n].prev = Some(inst),
            None => self.tail = Some(inst),
        }
    }

    /// Unlink `inst`. Per section 3's Lifecycle, this must only ever be
    /// called once per instruction — callers are expected to track
    /// deletion themselves (typically by leaving a `DUMMY` in its place or
    /// simply dropping all references to the freed `Inst`).
    pub fn remove(&mut self, inst: Inst) {
        let Node { prev, next, .. } = self.nodes[inst];
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[inst] = Node::default();
    }

    fn new_seq_before(&mut self, before: Inst) -> SequenceNumber {
        let prev = self.nodes[before].prev;
        let lo = prev.map_or(0, |p| self.nodes[p].seq);
        let hi = self.nodes[before].seq;
        if hi - lo > MINOR_STRIDE {
            (lo + hi) / 2
        } else {
            self.renumber_from(prev.unwrap_or(before));
            self.new_seq_before(before)
        }
    }

    fn new_seq_after(&mut self, after: Inst) -> SequenceNumber {
        let next = self.nodes[after].next;
        let lo = self.nodes[after].seq;
        match next {
            None => lo + MAJOR_STRIDE,
            Some(n) => {
                let hi = self.nodes[n].seq;
                if hi - lo > MINOR_STRIDE {
                    (lo + hi) / 2
                } else {
                    self.renumber_from(after);
                    self.new_seq_after(after)
                }
            }
        }
    }

    /// Full renumbering starting at `from`, restoring `MAJOR_STRIDE` gaps.
    /// Mirrors "Address numbering is recomputed the same way" (section 5):
    /// a whole-function renumber is cheap relative to how rarely local
    /// gaps are exhausted (bounded by [`LOCAL_RENUMBER_LIMIT`] per insert).
    fn renumber_from(&mut self, from: Inst) {
        let mut seq = self.nodes[from].seq;
        let mut cur = Some(from);
        while let Some(inst) = cur {
            self.nodes[inst].seq = seq;
            seq += MAJOR_STRIDE;
            cur = self.nodes[inst].next;
        }
    }

    pub fn renumber_all(&mut self) {
        if let Some(head) = self.head {
            self.renumber_from(head);
        }
    }

    pub fn iter(&self) -> LayoutIter<'_> {
        LayoutIter { layout: self, cur: self.head }
    }
}

/// Forward iteration over the list in program order.
pub struct LayoutIter<'a> {
    layout: &'a Layout,
    cur: Option<Inst>,
}

impl Iterator for LayoutIter<'_> {
    type Item = Inst;
    fn next(&mut self) -> Option<Inst> {
        let cur = self.cur?;
        self.cur = self.layout.next(cur);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn inst(n: u32) -> Inst {
        Inst::new(n as usize)
    }

    #[test]
    fn append_and_iterate() {
        let mut l = Layout::new();
        l.append(inst(0));
        l.append(inst(1));
        l.append(inst(2));
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![inst(0), inst(1), inst(2)]);
        assert_eq!(l.head(), Some(inst(0)));
        assert_eq!(l.tail(), Some(inst(2)));
    }

    #[test]
    fn insert_before_and_after_preserve_order() {
        let mut l = Layout::new();
        l.append(inst(0));
        l.append(inst(2));
        l.insert_before(inst(1), inst(2));
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![inst(0), inst(1), inst(2)]);
        l.insert_after(inst(3), inst(0));
        assert_eq!(
            l.iter().collect::<Vec<_>>(),
            vec![inst(0), inst(3), inst(1), inst(2)]
        );
    }

    #[test]
    fn remove_relinks_neighbors() {
        let mut l = Layout::new();
        l.append(inst(0));
        l.append(inst(1));
        l.append(inst(2));
        l.remove(inst(1));
        assert_eq!(l.iter().collect::<Vec<_>>(), vec![inst(0), inst(2)]);
        assert_eq!(l.next(inst(0)), Some(inst(2)));
        assert_eq!(l.prev(inst(2)), Some(inst(0)));
    }

    #[test]
    fn sequence_numbers_respect_program_order_after_many_inserts() {
        let mut l = Layout::new();
        l.append(inst(0));
        l.append(inst(100));
        // Repeatedly bisect between the same two neighbors until local
        // renumbering must kick in; order must still come out right.
        let mut prev = inst(0);
        for i in 1..20 {
            let n = inst(i);
            l.insert_after(n, prev);
            prev = n;
        }
        let order: Vec<Inst> = l.iter().collect();
        for w in order.windows(2) {
            assert!(l.seq(w[0]) < l.seq(w[1]));
        }
    }
}
