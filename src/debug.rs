//! Debug tables built alongside the code: the pc to line mapping and local
//! variable live ranges.

use crate::binding::LocalBinding;

/// Source line lookup for the method being generated.
///
/// `line_ends` holds the source offset of every line separator of the
/// compilation unit; lookups are restricted to the lines spanned by the method.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    line_ends: Vec<usize>,
    first_line: usize,
    last_line: usize,
}

impl LineMap {
    /// Map covering the whole compilation unit, used for `<clinit>` and
    /// constructors whose code comes from field initializers anywhere in the type.
    pub fn whole_unit(line_ends: Vec<usize>) -> Self {
        let last_line = line_ends.len().max(1);
        Self {
            line_ends,
            first_line: 1,
            last_line,
        }
    }

    /// Map restricted to the lines between `body_start` and `body_end`.
    pub fn for_method(line_ends: Vec<usize>, body_start: usize, body_end: usize) -> Self {
        let length = line_ends.len();
        if length == 0 {
            return Self {
                line_ends,
                first_line: 1,
                last_line: 1,
            };
        }
        let first_line = search_line(body_start, &line_ends, 0, length - 1);
        let last_line = if first_line > length - 1 {
            first_line
        } else {
            let mut end = search_line(body_end, &line_ends, first_line - 1, length - 1);
            if end >= length - 1 {
                end = length;
            }
            end.max(1)
        };
        Self {
            line_ends,
            first_line,
            last_line,
        }
    }

    pub fn line_of(&self, source_pos: usize) -> usize {
        if self.first_line == self.last_line {
            return self.first_line;
        }
        search_line(
            source_pos,
            &self.line_ends,
            self.first_line - 1,
            self.last_line - 1,
        )
    }
}

/// One-based line of `pos`, searching the separators in `ends[low..=high]`.
/// A position equal to a separator belongs to the line the separator ends.
fn search_line(pos: usize, ends: &[usize], low: usize, high: usize) -> usize {
    if ends.is_empty() {
        return 1;
    }
    let high = high.min(ends.len() - 1);
    let low = low.min(high);
    let before = ends[low..=high].partition_point(|end| *end < pos);
    low + before + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub start_pc: usize,
    pub line: usize,
}

/// Pending `LineNumberTable` for one method.
///
/// Entries stay sorted by strictly increasing `start_pc` with no two adjacent
/// entries on the same line.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    entries: Vec<LineEntry>,
    last_entry_pc: usize,
}

impl LineTable {
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_entry_pc = 0;
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn last_entry_pc(&self) -> usize {
        self.last_entry_pc
    }

    pub fn set_last_entry_pc(&mut self, pc: usize) {
        self.last_entry_pc = pc;
    }

    /// Where an entry for `pc` would go, or `None` if one already starts there.
    fn insertion_index(&self, pc: usize) -> Option<usize> {
        self.entries
            .binary_search_by_key(&pc, |entry| entry.start_pc)
            .err()
    }

    /// Attributes the code from `start_pc` up to `position` to `line`.
    ///
    /// With `widen`, an existing entry for the same line may be moved earlier
    /// to cover code emitted before it.
    pub fn record(&mut self, start_pc: usize, position: usize, line: usize, widen: bool) {
        let changed = self.apply(start_pc, position, line, widen);
        self.last_entry_pc = position;
        if let Some(index) = changed {
            self.normalize_at(index);
        }
    }

    /// Updates the entries for one recording and returns the index of the
    /// entry that was added or modified.
    fn apply(&mut self, start_pc: usize, position: usize, line: usize, widen: bool) -> Option<usize> {
        let Some(last) = self.entries.last().copied() else {
            self.entries.push(LineEntry { start_pc, line });
            return Some(0);
        };
        let last_index = self.entries.len() - 1;
        if last.line != line {
            if start_pc > self.last_entry_pc {
                self.entries.push(LineEntry { start_pc, line });
                return Some(last_index + 1);
            }
            return match self.insertion_index(start_pc) {
                Some(index) => {
                    if self.entries.get(index).is_some_and(|entry| entry.line == line) {
                        self.entries[index].start_pc = start_pc;
                        Some(index)
                    } else if index == 0 || self.entries[index - 1].line != line {
                        self.entries.insert(index, LineEntry { start_pc, line });
                        Some(index)
                    } else {
                        None
                    }
                }
                None if position != self.last_entry_pc => {
                    if self.last_entry_pc == start_pc || self.last_entry_pc == last.start_pc {
                        self.entries[last_index].line = line;
                        Some(last_index)
                    } else {
                        self.entries.push(LineEntry {
                            start_pc: self.last_entry_pc,
                            line,
                        });
                        Some(last_index + 1)
                    }
                }
                None if last.line < line && widen => {
                    self.entries[last_index].line = line;
                    Some(last_index)
                }
                None => None,
            };
        }
        if start_pc >= last.start_pc {
            return None;
        }
        let index = self.insertion_index(start_pc)?;
        if index > 0 && self.entries[index - 1].line == line {
            return None;
        }
        if last_index > 1 && self.entries[last_index - 1].start_pc > start_pc {
            self.entries.pop();
            self.entries.insert(index, LineEntry { start_pc, line });
            Some(index)
        } else {
            self.entries[last_index].start_pc = start_pc;
            Some(last_index)
        }
    }

    /// Restores the ordering invariant around the entry at `index`, the only
    /// one touched since the table was last well formed. Consecutive entries
    /// on one line are merged into the earliest.
    fn normalize_at(&mut self, index: usize) {
        let pc = self.entries[index].start_pc;
        let ordered_left = index == 0 || self.entries[index - 1].start_pc < pc;
        let ordered_right = self.entries.get(index + 1).is_none_or(|next| pc < next.start_pc);
        if !(ordered_left && ordered_right) {
            return self.normalize();
        }
        let line = self.entries[index].line;
        if self.entries.get(index + 1).is_some_and(|next| next.line == line) {
            self.entries.remove(index + 1);
        }
        if index > 0 && self.entries[index - 1].line == line {
            self.entries.remove(index);
        }
    }

    /// Full rebuild for tables whose order was disturbed: a later entry for
    /// the same pc wins, then same-line runs are merged.
    fn normalize(&mut self) {
        self.entries.sort_by_key(|entry| entry.start_pc);
        let mut normalized: Vec<LineEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if let Some(previous) = normalized.last_mut()
                && previous.start_pc == entry.start_pc
            {
                *previous = entry;
            } else {
                normalized.push(entry);
            }
        }
        normalized.dedup_by(|current, previous| current.line == previous.line);
        self.entries = normalized;
    }

    /// Drops entries that start beyond `position`, after code was removed.
    pub fn remove_entries_after(&mut self, position: usize) {
        self.entries.retain(|entry| entry.start_pc <= position);
    }
}

/// Half-open pc interval during which a local is visible. `end` stays `None`
/// until the range is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub start: usize,
    pub end: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct LocalRecord {
    pub binding: LocalBinding,
    pub ranges: Vec<LiveRange>,
}

impl LocalRecord {
    pub fn new(binding: LocalBinding) -> Self {
        Self {
            binding,
            ranges: Vec::new(),
        }
    }

    pub fn has_open_range(&self) -> bool {
        self.ranges.last().is_some_and(|range| range.end.is_none())
    }

    pub fn open(&mut self, pc: usize) {
        if !self.has_open_range() {
            self.ranges.push(LiveRange {
                start: pc,
                end: None,
            });
        }
    }

    pub fn close(&mut self, pc: usize) {
        if let Some(range) = self.ranges.last_mut()
            && range.end.is_none()
        {
            range.end = Some(pc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_well_formed(table: &LineTable) {
        for pair in table.entries().windows(2) {
            assert!(pair[0].start_pc < pair[1].start_pc, "{:?}", table.entries());
            assert_ne!(pair[0].line, pair[1].line, "{:?}", table.entries());
        }
    }

    #[test]
    fn test_line_map_lookup() {
        // Lines end at offsets 10, 20 and 30; line 4 runs to the end.
        let map = LineMap::whole_unit(vec![10, 20, 30]);
        assert_eq!(map.line_of(0), 1);
        assert_eq!(map.line_of(10), 1);
        assert_eq!(map.line_of(11), 2);
        assert_eq!(map.line_of(25), 3);
        assert_eq!(map.line_of(31), 4);
    }

    #[test]
    fn test_single_line_method_map() {
        let map = LineMap::for_method(vec![10, 20, 30, 40, 50], 12, 18);
        assert_eq!(map.line_of(12), 2);
        assert_eq!(map.line_of(500), 2);
    }

    #[test]
    fn test_multi_line_method_map() {
        let map = LineMap::for_method(vec![10, 20, 30, 40, 50], 12, 35);
        assert_eq!(map.line_of(15), 2);
        assert_eq!(map.line_of(25), 3);
        assert_eq!(map.line_of(35), 4);
    }

    #[test]
    fn test_sequential_statements() {
        let mut table = LineTable::default();
        table.record(0, 3, 1, false);
        table.record(3, 7, 2, false);
        table.record(7, 9, 3, false);
        assert_eq!(
            table.entries(),
            &[
                LineEntry { start_pc: 0, line: 1 },
                LineEntry { start_pc: 3, line: 2 },
                LineEntry { start_pc: 7, line: 3 },
            ]
        );
        assert_eq!(table.last_entry_pc(), 9);
    }

    #[test]
    fn test_same_line_statements_are_coalesced() {
        let mut table = LineTable::default();
        table.record(0, 3, 5, false);
        table.record(3, 6, 5, false);
        assert_eq!(table.entries(), &[LineEntry { start_pc: 0, line: 5 }]);
    }

    #[test]
    fn test_nested_expression_reported_after_its_statement() {
        let mut table = LineTable::default();
        table.record(0, 2, 1, false);
        // Statement on line 2 covers [2, 10); an inner expression on line 3
        // covering [4, 10) is recorded after it.
        table.record(2, 10, 2, false);
        table.record(4, 10, 3, false);
        assert_well_formed(&table);
        assert_eq!(table.entries()[0], LineEntry { start_pc: 0, line: 1 });
        assert!(table.entries().iter().any(|entry| entry.line == 2));
    }

    #[test]
    fn test_entry_inserted_before_earlier_code() {
        let mut table = LineTable::default();
        table.record(0, 4, 1, false);
        table.record(8, 12, 3, false);
        table.record(4, 12, 2, false);
        assert_well_formed(&table);
        assert_eq!(
            table.entries(),
            &[
                LineEntry { start_pc: 0, line: 1 },
                LineEntry { start_pc: 4, line: 2 },
                LineEntry { start_pc: 8, line: 3 },
            ]
        );
    }

    #[test]
    fn test_widen_moves_same_line_entry_earlier() {
        let mut table = LineTable::default();
        table.record(0, 2, 1, false);
        table.record(5, 8, 2, false);
        table.record(2, 8, 2, true);
        assert_eq!(
            table.entries(),
            &[
                LineEntry { start_pc: 0, line: 1 },
                LineEntry { start_pc: 2, line: 2 },
            ]
        );
    }

    #[test]
    fn test_remove_entries_after_truncation() {
        let mut table = LineTable::default();
        table.record(0, 3, 1, false);
        table.record(3, 6, 2, false);
        table.remove_entries_after(2);
        assert_eq!(table.entries(), &[LineEntry { start_pc: 0, line: 1 }]);
    }

    #[test]
    fn test_random_recording_stays_well_formed() {
        let mut table = LineTable::default();
        let mut position = 0;
        let steps = [
            (0, 3, 1, false),
            (3, 5, 4, false),
            (1, 5, 2, true),
            (5, 9, 4, false),
            (2, 9, 3, false),
            (9, 12, 1, true),
            (6, 12, 6, false),
        ];
        for (start_pc, advance, line, widen) in steps {
            position += advance;
            table.record(start_pc, position, line, widen);
            assert_well_formed(&table);
        }
    }

    #[test]
    fn test_generated_recordings_stay_well_formed() {
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut table = LineTable::default();
            let mut position = 0;
            for _ in 0..60 {
                position += rng.gen_range(0..5);
                let start_pc = rng.gen_range(0..=position);
                let line = rng.gen_range(1..8);
                let widen = rng.gen_bool(0.3);
                table.record(start_pc, position, line, widen);
                assert_well_formed(&table);
                if rng.gen_bool(0.05) {
                    let cut = rng.gen_range(0..=position);
                    table.remove_entries_after(cut);
                    assert_well_formed(&table);
                }
            }
        }
    }

    #[test]
    fn test_local_record_ranges() {
        let binding = LocalBinding::new("x", "I", 1, crate::binding::ScopeId(0)).unwrap();
        let mut record = LocalRecord::new(binding);
        record.open(2);
        record.open(3);
        assert!(record.has_open_range());
        record.close(9);
        record.close(11);
        assert_eq!(
            record.ranges,
            vec![LiveRange {
                start: 2,
                end: Some(9)
            }]
        );
    }
}
