//! Branch targets with deferred patching.
//!
//! Labels live in an arena owned by the emitter and are referred to by
//! [`LabelId`]. A label that has not been placed yet remembers the offsets of
//! every branch operand that refers to it; placing it patches them all. A
//! label can also be redirected to another one, after which every branch to it
//! is recorded on, and patched with, its delegate.

use crate::error::EmitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(u32);

impl LabelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Location of a branch operand waiting for its target.
///
/// `offset` is the position of the operand bytes; the branch opcode sits one
/// byte before it. Wide sites hold four bytes, narrow sites two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PatchSite {
    pub offset: usize,
    pub wide: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Branch,
    /// Target of a `tableswitch`/`lookupswitch` entry. Offsets are relative to
    /// the switch opcode rather than to the operand.
    Case { switch_position: Option<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelState {
    Direct(Vec<PatchSite>),
    DelegatingTo(LabelId),
}

#[derive(Debug, Clone)]
pub struct Label {
    pub kind: LabelKind,
    pub position: Option<usize>,
    pub state: LabelState,
    pub used: bool,
}

impl Label {
    fn new(kind: LabelKind) -> Self {
        Self {
            kind,
            position: None,
            state: LabelState::Direct(Vec::new()),
            used: false,
        }
    }

    pub fn is_case(&self) -> bool {
        matches!(self.kind, LabelKind::Case { .. })
    }

    pub fn delegate(&self) -> Option<LabelId> {
        match self.state {
            LabelState::DelegatingTo(target) => Some(target),
            LabelState::Direct(_) => None,
        }
    }

    pub fn patch_sites(&self) -> &[PatchSite] {
        match &self.state {
            LabelState::Direct(sites) => sites,
            LabelState::DelegatingTo(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelArena {
    labels: Vec<Label>,
}

impl LabelArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.labels.clear();
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn new_branch(&mut self) -> LabelId {
        self.push(Label::new(LabelKind::Branch))
    }

    pub fn new_case(&mut self) -> LabelId {
        self.push(Label::new(LabelKind::Case {
            switch_position: None,
        }))
    }

    fn push(&mut self, label: Label) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(label);
        id
    }

    pub fn get(&self, id: LabelId) -> Result<&Label, EmitError> {
        self.labels.get(id.index()).ok_or(EmitError::UnknownLabel(id))
    }

    pub fn get_mut(&mut self, id: LabelId) -> Result<&mut Label, EmitError> {
        self.labels
            .get_mut(id.index())
            .ok_or(EmitError::UnknownLabel(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &Label)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(index, label)| (LabelId(index as u32), label))
    }

    /// Follows delegation to the label that actually owns the patch sites.
    ///
    /// The walk is bounded by the arena size so a malformed chain cannot loop.
    pub fn resolve(&self, id: LabelId) -> Result<LabelId, EmitError> {
        let mut current = id;
        for _ in 0..=self.labels.len() {
            match self.get(current)?.delegate() {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(EmitError::UnknownLabel(id))
    }

    /// Records a pending branch operand on `id` (or on its delegate).
    pub fn add_patch_site(&mut self, id: LabelId, site: PatchSite) -> Result<LabelId, EmitError> {
        let owner = self.resolve(id)?;
        let label = self.get_mut(owner)?;
        label.used = true;
        if let LabelState::Direct(sites) = &mut label.state
            && let Err(index) = sites.binary_search(&site)
        {
            sites.insert(index, site);
        }
        Ok(owner)
    }

    /// Redirects every current and future branch to `other` onto `target`.
    ///
    /// Returns `false` when the redirection would be invalid: `other` is the
    /// target itself, already delegates, or is a case label, or `target` itself
    /// delegates.
    pub fn become_delegate_for(&mut self, target: LabelId, other: LabelId) -> Result<bool, EmitError> {
        if target == other {
            return Ok(false);
        }
        let other_label = self.get(other)?;
        if other_label.is_case() || other_label.delegate().is_some() {
            return Ok(false);
        }
        if self.get(target)?.delegate().is_some() {
            return Ok(false);
        }
        let other_label = self.get_mut(other)?;
        let moved = match std::mem::replace(&mut other_label.state, LabelState::DelegatingTo(target)) {
            LabelState::Direct(sites) => sites,
            LabelState::DelegatingTo(_) => Vec::new(),
        };
        let other_used = other_label.used;
        let target_label = self.get_mut(target)?;
        target_label.used |= other_used;
        if let LabelState::Direct(sites) = &mut target_label.state {
            sites.extend(moved);
            sites.sort();
            sites.dedup();
        }
        log::trace!("label {other:?} now delegates to {target:?}");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(offset: usize) -> PatchSite {
        PatchSite {
            offset,
            wide: false,
        }
    }

    #[test]
    fn test_patch_sites_sorted_and_deduplicated() {
        let mut arena = LabelArena::new();
        let label = arena.new_branch();
        arena.add_patch_site(label, site(9)).unwrap();
        arena.add_patch_site(label, site(3)).unwrap();
        arena.add_patch_site(label, site(9)).unwrap();
        let sites = arena.get(label).unwrap().patch_sites();
        assert_eq!(sites, &[site(3), site(9)]);
        assert!(arena.get(label).unwrap().used);
    }

    #[test]
    fn test_delegation_moves_sites_and_redirects_new_ones() {
        let mut arena = LabelArena::new();
        let target = arena.new_branch();
        let other = arena.new_branch();
        arena.add_patch_site(target, site(10)).unwrap();
        arena.add_patch_site(other, site(4)).unwrap();

        assert!(arena.become_delegate_for(target, other).unwrap());
        assert_eq!(arena.resolve(other).unwrap(), target);
        assert_eq!(arena.get(other).unwrap().patch_sites(), &[]);

        let owner = arena.add_patch_site(other, site(20)).unwrap();
        assert_eq!(owner, target);
        assert_eq!(
            arena.get(target).unwrap().patch_sites(),
            &[site(4), site(10), site(20)]
        );
    }

    #[test]
    fn test_delegation_refuses_invalid_chains() {
        let mut arena = LabelArena::new();
        let a = arena.new_branch();
        let b = arena.new_branch();
        let case = arena.new_case();
        assert!(!arena.become_delegate_for(a, a).unwrap());
        assert!(!arena.become_delegate_for(a, case).unwrap());
        assert!(arena.become_delegate_for(a, b).unwrap());
        // b already delegates, and a label cannot delegate to a delegating one.
        assert!(!arena.become_delegate_for(a, b).unwrap());
        assert!(!arena.become_delegate_for(b, a).unwrap());
    }

    #[test]
    fn test_unknown_label() {
        let mut arena = LabelArena::new();
        let label = arena.new_branch();
        arena.clear();
        assert_eq!(arena.resolve(label), Err(EmitError::UnknownLabel(label)));
    }
}
