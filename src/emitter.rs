//! Per-method code emitter.
//!
//! [`CodeEmitter`] appends instructions to a growable buffer while tracking
//! operand stack depth, the local variable high-water mark, pending branch
//! patches and the debug tables. Instruction encoders live in
//! [`crate::instructions`]; higher level helpers in [`crate::conversions`],
//! [`crate::strings`] and [`crate::synthetic`].
//!
//! Errors are latched: the first failure is kept and returned by
//! [`CodeEmitter::finish`], later instructions are still encoded so callers do
//! not have to check every call.

use crate::binding::{LocalBinding, MethodBinding, ScopeId};
use crate::buffer::CodeBuffer;
use crate::constant_pool::ConstantPool;
use crate::debug::{LineEntry, LineMap, LineTable, LiveRange, LocalRecord};
use crate::error::EmitError;
use crate::label::{LabelArena, LabelId, LabelKind, LabelState, PatchSite};
use crate::method::{ExceptionTableEntry, LineNumber, LocalVariable, MethodCode};
use crate::opcodes;
use crate::options::CodegenOptions;
use crate::types::TypeId;

/// Largest code array a method may have.
pub const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u32);

#[derive(Debug, Clone)]
struct ExceptionHandler {
    catch_type: u16,
    ranges: Vec<LiveRange>,
    handler_pc: Option<usize>,
}

pub struct CodeEmitter<'a> {
    pool: &'a mut dyn ConstantPool,
    options: CodegenOptions,
    buffer: CodeBuffer,
    stack_depth: i32,
    stack_max: i32,
    max_locals: u32,
    labels: LabelArena,
    /// Labels placed since the last instruction, in placement order.
    labels_at_position: Vec<LabelId>,
    last_abrupt_completion: Option<usize>,
    wide_mode: bool,
    line_map: Option<LineMap>,
    lines: LineTable,
    locals: Vec<LocalRecord>,
    visible_locals: Vec<LocalId>,
    handlers: Vec<ExceptionHandler>,
    error: Option<EmitError>,
}

impl<'a> CodeEmitter<'a> {
    pub fn new(pool: &'a mut dyn ConstantPool, options: CodegenOptions) -> Self {
        Self {
            pool,
            options,
            buffer: CodeBuffer::new(),
            stack_depth: 0,
            stack_max: 0,
            max_locals: 0,
            labels: LabelArena::new(),
            labels_at_position: Vec::new(),
            last_abrupt_completion: None,
            wide_mode: false,
            line_map: None,
            lines: LineTable::default(),
            locals: Vec::new(),
            visible_locals: Vec::new(),
            handlers: Vec::new(),
            error: None,
        }
    }

    /// Clears all per-method state. Wide mode and the line map are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stack_depth = 0;
        self.stack_max = 0;
        self.max_locals = 0;
        self.labels.clear();
        self.labels_at_position.clear();
        self.last_abrupt_completion = None;
        self.lines.clear();
        self.locals.clear();
        self.visible_locals.clear();
        self.handlers.clear();
        self.error = None;
    }

    /// Starts the method over with every branch encoded in its 32-bit form.
    pub fn reset_in_wide_mode(&mut self) {
        self.reset();
        self.wide_mode = true;
    }

    pub fn set_line_map(&mut self, line_map: Option<LineMap>) {
        self.line_map = line_map;
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn pool(&mut self) -> &mut dyn ConstantPool {
        &mut *self.pool
    }

    pub fn position(&self) -> usize {
        self.buffer.position()
    }

    pub fn code(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn stack_depth(&self) -> i32 {
        self.stack_depth
    }

    /// Overrides the tracked depth, e.g. when entering code reached from
    /// several paths with a known depth.
    pub fn set_stack_depth(&mut self, depth: i32) {
        self.stack_depth = depth;
        self.stack_max = self.stack_max.max(depth);
    }

    pub fn stack_max(&self) -> i32 {
        self.stack_max
    }

    pub fn max_locals(&self) -> u32 {
        self.max_locals
    }

    pub fn is_wide_mode(&self) -> bool {
        self.wide_mode
    }

    pub fn last_abrupt_completion(&self) -> Option<usize> {
        self.last_abrupt_completion
    }

    pub fn error(&self) -> Option<&EmitError> {
        self.error.as_ref()
    }

    pub(crate) fn fail(&mut self, error: EmitError) {
        if self.error.is_none() {
            log::debug!("code emission failed at {}: {error}", self.position());
            self.error = Some(error);
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut CodeBuffer {
        &mut self.buffer
    }

    pub(crate) fn adjust_stack(&mut self, delta: i32) {
        self.stack_depth += delta;
        if self.stack_depth > self.stack_max {
            self.stack_max = self.stack_depth;
        }
    }

    /// Every instruction starts here: labels placed before it no longer sit
    /// at the current position once it is written.
    pub(crate) fn begin_instruction(&mut self) {
        self.labels_at_position.clear();
    }

    /// Writes a single-byte instruction with a fixed stack effect.
    pub(crate) fn simple(&mut self, opcode: u8, delta: i32) {
        self.begin_instruction();
        self.adjust_stack(delta);
        self.buffer.write_u1(opcode);
    }

    pub(crate) fn mark_abrupt(&mut self) {
        self.last_abrupt_completion = Some(self.position());
    }

    pub(crate) fn reserve_locals(&mut self, index: u16, slots: u16) {
        let required = index as u32 + slots as u32;
        if required > self.max_locals {
            self.max_locals = required;
        }
    }

    /// Sets `max_locals` to the slots taken by the receiver and parameters.
    pub fn initialize_max_locals(&mut self, method: Option<&MethodBinding>) {
        self.max_locals = match method {
            None => 0,
            Some(method) => {
                let receiver = if method.is_static() { 0 } else { 1 };
                receiver + method.argument_slots() as u32
            }
        };
    }

    /// Accounts for a value pushed by code the emitter did not generate.
    pub fn push_on_stack(&mut self, type_id: TypeId) {
        self.adjust_stack(type_id.slots() as i32);
    }

    /// A handler is entered with exactly the thrown exception on the stack.
    pub fn push_exception_on_stack(&mut self) {
        self.stack_depth = 1;
        if self.stack_max < 1 {
            self.stack_max = 1;
        }
    }

    pub fn new_label(&mut self) -> LabelId {
        self.labels.new_branch()
    }

    pub fn new_case_label(&mut self) -> LabelId {
        self.labels.new_case()
    }

    pub fn label_position(&self, label: LabelId) -> Option<usize> {
        self.labels
            .resolve(label)
            .and_then(|owner| self.labels.get(owner))
            .ok()
            .and_then(|owner| owner.position)
    }

    /// Whether any branch was ever emitted to `label`.
    pub fn is_label_used(&self, label: LabelId) -> bool {
        self.labels.get(label).is_ok_and(|label| label.used)
    }

    /// Binds `label` to the current position and patches the branches
    /// already emitted to it.
    ///
    /// Placing a branch label right after a `goto` to it removes the goto.
    pub fn place(&mut self, label: LabelId) {
        let kind = match self.labels.get(label) {
            Ok(found) => found.kind,
            Err(error) => return self.fail(error),
        };
        match kind {
            LabelKind::Branch => self.place_branch_label(label),
            LabelKind::Case { switch_position } => self.place_case_label(label, switch_position),
        }
    }

    fn place_branch_label(&mut self, id: LabelId) {
        let old_position = self.position();
        let (sites, already_placed) = match self.labels.get(id) {
            Ok(label) => (label.patch_sites().to_vec(), label.position.is_some()),
            Err(error) => return self.fail(error),
        };
        if already_placed {
            return self.fail(EmitError::LabelPlacedTwice(id));
        }
        let mut position = old_position;
        let mut sites = sites;
        let optimized = sites.last().is_some_and(|last| {
            !last.wide
                && last.offset + 2 == position
                && position >= 3
                && self.buffer.byte_at(position - 3) == Some(opcodes::GOTO)
        });
        if optimized {
            position -= 3;
            self.buffer.truncate(position);
            sites.pop();
            if self.last_abrupt_completion == Some(old_position) {
                self.last_abrupt_completion = None;
            }
            if self.lines.last_entry_pc() == old_position {
                self.lines.set_last_entry_pc(position);
            }
            if self.options.generates_lines() {
                self.lines.remove_entries_after(position);
            }
            if self.options.generates_vars() {
                self.pull_back_live_ranges(old_position, position);
            }
            log::trace!("removed goto to {id:?} at {position}");
        }
        if let Ok(label) = self.labels.get_mut(id) {
            label.position = Some(position);
            if let LabelState::Direct(current) = &mut label.state {
                *current = sites.clone();
            }
        }
        self.labels_at_position.push(id);
        for site in sites {
            self.write_patch(site, position);
        }
        if optimized {
            self.optimize_branch(old_position, position);
        }
    }

    fn pull_back_live_ranges(&mut self, old_position: usize, position: usize) {
        for local in &mut self.locals {
            if let Some(range) = local.ranges.last_mut() {
                if range.end == Some(old_position) {
                    range.end = Some(position);
                }
                if range.start == old_position {
                    range.start = position;
                }
            }
        }
    }

    /// Moves the labels that were placed at `old_position` to `position` after
    /// a trailing goto was removed, and rewrites their branches.
    fn optimize_branch(&mut self, old_position: usize, position: usize) {
        let moved: Vec<LabelId> = self
            .labels_at_position
            .iter()
            .copied()
            .filter(|id| {
                self.labels
                    .get(*id)
                    .is_ok_and(|label| label.position == Some(old_position))
            })
            .collect();
        for id in moved {
            let Ok(label) = self.labels.get_mut(id) else {
                continue;
            };
            label.position = Some(position);
            let kind = label.kind;
            let sites = label.patch_sites().to_vec();
            match kind {
                LabelKind::Case {
                    switch_position: Some(switch_position),
                } => {
                    let offset = position as i64 - switch_position as i64;
                    for site in sites {
                        self.write_offset(site.offset, offset, true);
                    }
                }
                LabelKind::Case { .. } => {}
                LabelKind::Branch => {
                    for site in sites {
                        self.write_patch(site, position);
                    }
                }
            }
        }
    }

    fn place_case_label(&mut self, id: LabelId, switch_position: Option<usize>) {
        let position = self.position();
        let sites = match self.labels.get_mut(id) {
            Ok(label) => {
                label.position = Some(position);
                label.patch_sites().to_vec()
            }
            Err(error) => return self.fail(error),
        };
        if let Some(switch_position) = switch_position {
            let offset = position as i64 - switch_position as i64;
            for site in sites {
                self.write_offset(site.offset, offset, true);
            }
            self.labels_at_position.push(id);
        }
    }

    /// Records the switch opcode position on a case label so its offsets can
    /// be computed relative to it.
    pub(crate) fn place_case_instruction(&mut self, id: LabelId, switch_position: usize) {
        match self.labels.get_mut(id) {
            Ok(label) => match &mut label.kind {
                LabelKind::Case {
                    switch_position: current,
                } => {
                    if current.is_none() {
                        *current = Some(switch_position);
                    }
                }
                LabelKind::Branch => self.fail(EmitError::ExpectedCaseLabel(id)),
            },
            Err(error) => self.fail(error),
        }
    }

    fn write_patch(&mut self, site: PatchSite, target: usize) {
        let offset = target as i64 - site.offset as i64 + 1;
        self.write_offset(site.offset, offset, site.wide);
    }

    fn write_offset(&mut self, at: usize, offset: i64, wide: bool) {
        let written = if wide {
            match i32::try_from(offset) {
                Ok(value) => self.buffer.write_i4_at(at, value),
                Err(_) => {
                    return self.fail(EmitError::BranchOffsetOverflow { site: at, offset });
                }
            }
        } else {
            match i16::try_from(offset) {
                Ok(value) => self.buffer.write_i2_at(at, value),
                Err(_) => return self.narrow_overflow(at, offset),
            }
        };
        if !written {
            self.fail(EmitError::BranchOffsetOverflow { site: at, offset });
        }
    }

    fn narrow_overflow(&mut self, site: usize, offset: i64) {
        if self.wide_mode {
            self.fail(EmitError::BranchOffsetOverflow { site, offset });
        } else {
            self.fail(EmitError::NeedsWideRetry);
        }
    }

    /// Writes the 16-bit operand of a branch to `label` at the current position.
    pub(crate) fn branch(&mut self, label: LabelId) {
        self.branch_operand(label, false);
    }

    /// Writes the 32-bit operand of a `goto_w`/`jsr_w` to `label`.
    pub(crate) fn branch_wide(&mut self, label: LabelId) {
        self.branch_operand(label, true);
    }

    fn branch_operand(&mut self, label: LabelId, wide: bool) {
        let site = PatchSite {
            offset: self.position(),
            wide,
        };
        let owner = match self.labels.resolve(label) {
            Ok(owner) => owner,
            Err(error) => return self.fail(error),
        };
        let target = match self.labels.get_mut(owner) {
            Ok(found) => {
                found.used = true;
                found.position
            }
            Err(error) => return self.fail(error),
        };
        match target {
            None => {
                if let Err(error) = self.labels.add_patch_site(owner, site) {
                    return self.fail(error);
                }
                if wide {
                    self.buffer.write_i4(0);
                } else {
                    self.buffer.write_i2(0);
                }
            }
            Some(target) => {
                let offset = target as i64 - site.offset as i64 + 1;
                if wide {
                    self.buffer.write_i4(0);
                } else {
                    self.buffer.write_i2(0);
                }
                self.write_offset(site.offset, offset, wide);
                // Branches merged in from delegated labels still need the target.
                self.patch_label_sites(owner, target);
            }
        }
    }

    fn patch_label_sites(&mut self, owner: LabelId, target: usize) {
        let sites = match self.labels.get(owner) {
            Ok(label) => label.patch_sites().to_vec(),
            Err(_) => return,
        };
        for site in sites {
            self.write_patch(site, target);
        }
    }

    /// Writes a 32-bit switch entry to a case label.
    pub(crate) fn case_branch(&mut self, label: LabelId) {
        let at = self.position();
        let (kind, position) = match self.labels.get_mut(label) {
            Ok(found) => {
                found.used = true;
                (found.kind, found.position)
            }
            Err(error) => return self.fail(error),
        };
        let LabelKind::Case { switch_position } = kind else {
            self.buffer.write_i4(0);
            return self.fail(EmitError::ExpectedCaseLabel(label));
        };
        match (position, switch_position) {
            (Some(position), Some(switch_position)) => {
                self.buffer
                    .write_i4((position as i64 - switch_position as i64) as i32);
            }
            _ => {
                if let Err(error) = self
                    .labels
                    .add_patch_site(label, PatchSite { offset: at, wide: true })
                {
                    self.fail(error);
                }
                self.buffer.write_i4(0);
            }
        }
    }

    /// Makes `target` the delegate of every branch label placed at
    /// `goto_location`, so that branches to them skip the goto.
    ///
    /// Returns `true` when at least one label was redirected and none of the
    /// labels there forbids removing the goto.
    fn inline_forward_references_from_labels_targeting(
        &mut self,
        target: LabelId,
        goto_location: usize,
    ) -> bool {
        match self.labels.get(target) {
            Ok(label) if label.delegate().is_none() => {}
            _ => return false,
        }
        let mut optimizable = false;
        let mut cannot_optimize = false;
        let at_location: Vec<LabelId> = self.labels_at_position.iter().rev().copied().collect();
        for id in at_location {
            let Ok(label) = self.labels.get(id) else {
                break;
            };
            if label.position != Some(goto_location) {
                break;
            }
            if id == target {
                cannot_optimize = true;
                continue;
            }
            if label.is_case() {
                cannot_optimize = true;
                continue;
            }
            if label.delegate().is_some() {
                continue;
            }
            match self.labels.become_delegate_for(target, id) {
                Ok(true) => optimizable = true,
                Ok(false) => {}
                Err(error) => self.fail(error),
            }
        }
        optimizable && !cannot_optimize
    }

    fn has_labels_at(&self, position: usize) -> bool {
        self.labels_at_position.iter().any(|id| {
            self.labels
                .get(*id)
                .is_ok_and(|label| label.position == Some(position))
        })
    }

    /// Unconditional jump.
    ///
    /// Labels placed at the current position are redirected to `label`. When
    /// the previous instruction completes abruptly and that redirection
    /// succeeds, or no label makes the current position reachable, nothing
    /// is written.
    pub fn goto_(&mut self, label: LabelId) {
        if self.wide_mode {
            return self.goto_w(label);
        }
        let position = self.position();
        let chained = self.inline_forward_references_from_labels_targeting(label, position);
        let unreachable = self.last_abrupt_completion == Some(position)
            && !self
                .handlers
                .iter()
                .any(|handler| handler.handler_pc == Some(position));
        if unreachable && (chained || !self.has_labels_at(position)) {
            if chained && let Some(target) = self.label_position(label) {
                if let Ok(owner) = self.labels.resolve(label) {
                    self.patch_label_sites(owner, target);
                }
                self.labels_at_position.clear();
            }
            log::trace!("goto {label:?} at {position} not emitted");
            return;
        }
        self.begin_instruction();
        self.buffer.write_u1(opcodes::GOTO);
        self.branch(label);
        self.mark_abrupt();
    }

    pub fn goto_w(&mut self, label: LabelId) {
        self.begin_instruction();
        self.buffer.write_u1(opcodes::GOTO_W);
        self.branch_wide(label);
        self.mark_abrupt();
    }

    /// Conditional branch; in wide mode emitted as the negated condition over
    /// a `goto_w`.
    pub(crate) fn conditional_branch(&mut self, opcode: u8, delta: i32, label: LabelId) {
        self.begin_instruction();
        self.adjust_stack(delta);
        if self.wide_mode
            && let Some(reverted) = opcodes::negate_branch(opcode)
        {
            self.wide_reverted_conditional_branch(reverted, label);
            return;
        }
        self.buffer.write_u1(opcode);
        self.branch(label);
    }

    fn wide_reverted_conditional_branch(&mut self, reverted: u8, label: LabelId) {
        let intermediate = self.new_label();
        self.buffer.write_u1(reverted);
        self.branch(intermediate);
        self.goto_w(label);
        self.place(intermediate);
    }

    /// Registers a local so its live ranges can be tracked.
    pub fn record_local(&mut self, binding: LocalBinding) -> LocalId {
        self.reserve_locals(binding.slot, binding.field_type.slots());
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalRecord::new(binding));
        id
    }

    pub fn local(&self, id: LocalId) -> Option<&LocalBinding> {
        self.locals.get(id.0 as usize).map(|record| &record.binding)
    }

    pub fn live_ranges(&self, id: LocalId) -> &[LiveRange] {
        self.locals
            .get(id.0 as usize)
            .map_or(&[], |record| record.ranges.as_slice())
    }

    pub fn visible_locals(&self) -> &[LocalId] {
        &self.visible_locals
    }

    /// Makes a local visible and opens a live range at the current position.
    pub fn add_visible_local(&mut self, id: LocalId) {
        if !self.options.generates_vars() {
            return;
        }
        if !self.visible_locals.contains(&id) {
            self.visible_locals.push(id);
        }
        self.record_initialization_start(id);
    }

    /// Opens a new live range, e.g. after the local is assigned again.
    pub fn record_initialization_start(&mut self, id: LocalId) {
        if !self.options.generates_vars() {
            return;
        }
        let position = self.position();
        if let Some(record) = self.locals.get_mut(id.0 as usize) {
            record.open(position);
        }
    }

    pub fn record_initialization_end(&mut self, id: LocalId) {
        if !self.options.generates_vars() {
            return;
        }
        let position = self.position();
        if let Some(record) = self.locals.get_mut(id.0 as usize) {
            record.close(position);
        }
    }

    /// Closes the live range of a local and hides it.
    pub fn remove_variable(&mut self, id: LocalId) {
        self.record_initialization_end(id);
        self.visible_locals.retain(|visible| *visible != id);
    }

    /// Closes and hides every visible local declared in `scope`.
    pub fn exit_user_scope(&mut self, scope: ScopeId) {
        self.exit_user_scope_except(scope, &[]);
    }

    /// Like [`exit_user_scope`](Self::exit_user_scope) but leaves `keep` visible.
    pub fn exit_user_scope_except(&mut self, scope: ScopeId, keep: &[LocalId]) {
        if !self.options.generates_vars() {
            return;
        }
        let position = self.position();
        let locals = &mut self.locals;
        self.visible_locals.retain(|id| {
            if keep.contains(id) {
                return true;
            }
            match locals.get_mut(id.0 as usize) {
                Some(record) if record.binding.scope == scope => {
                    record.close(position);
                    false
                }
                _ => true,
            }
        });
    }

    /// Extends ranges in `scope` that were closed at `pos` to the current
    /// position, for code appended to a scope after it was exited.
    pub fn update_last_recorded_end_pc(&mut self, scope: ScopeId, pos: usize) {
        let position = self.position();
        if self.options.generates_lines() {
            self.lines.set_last_entry_pc(pos);
        }
        if self.options.generates_vars() {
            for record in &mut self.locals {
                if record.binding.scope != scope {
                    continue;
                }
                if let Some(range) = record.ranges.last_mut()
                    && range.end == Some(pos)
                {
                    range.end = Some(position);
                }
            }
        }
    }

    /// Registers a handler catching `catch_type`, or everything when `None`.
    pub fn new_exception_handler(&mut self, catch_type: Option<&str>) -> HandlerId {
        let catch_type = catch_type.map_or(0, |name| self.pool.class(name));
        let id = HandlerId(self.handlers.len() as u32);
        self.handlers.push(ExceptionHandler {
            catch_type,
            ranges: Vec::new(),
            handler_pc: None,
        });
        id
    }

    /// Opens a protected range. A range closed at this very position is
    /// reopened instead.
    pub fn place_handler_start(&mut self, id: HandlerId) {
        let position = self.position();
        let Some(handler) = self.handlers.get_mut(id.0 as usize) else {
            return;
        };
        match handler.ranges.last_mut() {
            Some(range) if range.end == Some(position) => range.end = None,
            _ => handler.ranges.push(LiveRange {
                start: position,
                end: None,
            }),
        }
    }

    /// Closes the open protected range; empty ranges are discarded.
    pub fn place_handler_end(&mut self, id: HandlerId) {
        let position = self.position();
        let Some(handler) = self.handlers.get_mut(id.0 as usize) else {
            return;
        };
        if let Some(range) = handler.ranges.last_mut()
            && range.end.is_none()
        {
            if range.start == position {
                handler.ranges.pop();
            } else {
                range.end = Some(position);
            }
        }
    }

    /// Binds the handler entry point to the current position.
    pub fn place_handler(&mut self, id: HandlerId) {
        let position = self.position();
        if let Some(handler) = self.handlers.get_mut(id.0 as usize) {
            handler.handler_pc = Some(position);
        }
    }

    /// Attributes the code emitted since `start_pc` to the line containing
    /// `source_pos`.
    pub fn record_positions_from(&mut self, start_pc: usize, source_pos: usize, widen: bool) {
        let position = self.position();
        if !self.options.generates_lines() || source_pos == 0 || (start_pc == position && !widen) {
            return;
        }
        let Some(line_map) = &self.line_map else {
            return;
        };
        let line = line_map.line_of(source_pos);
        self.lines.record(start_pc, position, line, widen);
    }

    pub fn line_entries(&self) -> &[LineEntry] {
        self.lines.entries()
    }

    /// Validates the method and returns its code and tables.
    pub fn finish(&mut self) -> Result<MethodCode, EmitError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        for (id, label) in self.labels.iter() {
            if label.position.is_none() && !label.patch_sites().is_empty() {
                return Err(EmitError::UnplacedLabel(id));
            }
        }
        let length = self.position();
        if length > MAX_CODE_LENGTH {
            return Err(EmitError::CodeTooLarge(length));
        }
        if let Some(open) = self.locals.iter().find(|record| record.has_open_range()) {
            return Err(EmitError::UnclosedLocal(open.binding.name.clone()));
        }

        let line_numbers = self
            .lines
            .entries()
            .iter()
            .filter(|entry| entry.start_pc < length)
            .map(|entry| LineNumber {
                start_pc: entry.start_pc as u16,
                line_number: entry.line as u16,
            })
            .collect();

        let mut local_variables = Vec::new();
        for record in &self.locals {
            for range in &record.ranges {
                let Some(end) = range.end else { continue };
                if end <= range.start {
                    continue;
                }
                local_variables.push(LocalVariable {
                    start_pc: range.start as u16,
                    length: (end - range.start) as u16,
                    name_index: self.pool.utf8(&record.binding.name),
                    descriptor_index: self.pool.utf8(&record.binding.descriptor),
                    index: record.binding.slot,
                });
            }
        }

        let mut exception_table = Vec::new();
        for handler in &self.handlers {
            let Some(handler_pc) = handler.handler_pc else {
                log::debug!("exception handler never placed, ranges dropped");
                continue;
            };
            for range in &handler.ranges {
                let Some(end) = range.end else { continue };
                exception_table.push(ExceptionTableEntry {
                    start_pc: range.start as u16,
                    end_pc: end as u16,
                    handler_pc: handler_pc as u16,
                    catch_type: handler.catch_type,
                });
            }
        }

        let max_stack = self.stack_max.clamp(0, u16::MAX as i32) as u16;
        let max_locals = self.max_locals.min(u16::MAX as u32) as u16;
        log::debug!(
            "method code finished: {length} bytes, max_stack {max_stack}, max_locals {max_locals}, wide {}",
            self.wide_mode
        );
        Ok(MethodCode {
            code: self.buffer.contents(),
            max_stack,
            max_locals,
            line_numbers,
            local_variables,
            exception_table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantPoolBuilder, CpInfo};
    use crate::options::{ATTR_LINES, ATTR_VARS};
    use crate::types::TargetLevel;

    fn local(e: &mut CodeEmitter<'_>, name: &str, slot: u16, scope: u32) -> LocalId {
        e.record_local(LocalBinding::new(name, "I", slot, ScopeId(scope)).unwrap())
    }

    fn entry(start_pc: usize, line: usize) -> LineEntry {
        LineEntry { start_pc, line }
    }

    #[test]
    fn test_goto_to_next_instruction_is_removed() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let label = e.new_label();
        e.goto_(label);
        assert_eq!(e.position(), 3);
        e.place(label);
        assert!(e.code().is_empty());
        assert_eq!(e.label_position(label), Some(0));
        assert_eq!(e.last_abrupt_completion(), None);
    }

    #[test]
    fn test_goto_after_abrupt_completion_is_chained() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let else_label = e.new_label();
        let end_label = e.new_label();
        e.iconst_0();
        e.ifeq(else_label);
        e.iconst_1();
        e.ireturn();
        e.place(else_label);
        // Nothing is written: branches to `else_label` now go to `end_label`.
        e.goto_(end_label);
        assert_eq!(e.position(), 6);
        e.iconst_2();
        e.ireturn();
        e.place(end_label);
        e.iconst_3();
        e.ireturn();
        assert_eq!(
            e.code(),
            &[
                opcodes::ICONST_0,
                opcodes::IFEQ,
                0,
                7,
                opcodes::ICONST_1,
                opcodes::IRETURN,
                opcodes::ICONST_2,
                opcodes::IRETURN,
                opcodes::ICONST_3,
                opcodes::IRETURN,
            ]
        );
        assert_eq!(e.label_position(else_label), Some(8));
    }

    #[test]
    fn test_unreachable_goto_is_skipped() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let label = e.new_label();
        e.iconst_0();
        e.ireturn();
        e.goto_(label);
        assert_eq!(e.position(), 2);
        assert!(!e.is_label_used(label));
        e.place(label);
        assert!(e.finish().is_ok());
    }

    #[test]
    fn test_backward_branch_is_patched_immediately() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let top = e.new_label();
        e.place(top);
        e.iconst_0();
        e.ifeq(top);
        assert_eq!(&e.code()[1..], &[opcodes::IFEQ, 0xFF, 0xFF]);
        assert_eq!(e.stack_depth(), 0);
        assert_eq!(e.stack_max(), 1);
    }

    #[test]
    fn test_wide_mode_negates_conditional_branches() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        e.reset_in_wide_mode();
        let label = e.new_label();
        e.iload(0);
        e.ifeq(label);
        e.place(label);
        assert_eq!(
            e.code(),
            &[opcodes::ILOAD_0, opcodes::IFNE, 0, 8, opcodes::GOTO_W, 0, 0, 0, 5]
        );
        assert!(e.is_wide_mode());
    }

    #[test]
    fn test_first_error_is_kept() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let label = e.new_label();
        e.place(label);
        e.place(label);
        e.fail(EmitError::CodeTooLarge(0));
        assert_eq!(e.error(), Some(&EmitError::LabelPlacedTwice(label)));
        assert_eq!(e.finish().unwrap_err(), EmitError::LabelPlacedTwice(label));
        e.reset();
        assert!(e.error().is_none());
    }

    #[test]
    fn test_exception_ranges() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let handler = e.new_exception_handler(Some("java/lang/Exception"));
        e.place_handler_start(handler);
        e.place_handler_end(handler);
        e.place_handler_start(handler);
        e.iconst_0();
        e.pop();
        e.place_handler_end(handler);
        e.return_();
        e.push_exception_on_stack();
        e.place_handler(handler);
        e.athrow();
        let method = e.finish().unwrap();
        drop(e);
        assert_eq!(method.exception_table.len(), 1);
        let entry = &method.exception_table[0];
        assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 2, 3));
        assert!(matches!(pool.entries()[entry.catch_type as usize], CpInfo::Class { .. }));
        assert_eq!(method.max_stack, 1);
    }

    #[test]
    fn test_backward_branch_of_minus_32768_stays_narrow() {
        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let top = e.new_label();
        e.place(top);
        for _ in 0..32768 {
            e.nop();
        }
        e.goto_(top);
        assert!(e.error().is_none());
        assert_eq!(&e.code()[32768..], &[opcodes::GOTO, 0x80, 0x00]);

        let mut pool = ConstantPoolBuilder::new();
        let mut e = CodeEmitter::new(&mut pool, CodegenOptions::default());
        let top = e.new_label();
        e.place(top);
        for _ in 0..32769 {
            e.nop();
        }
        e.goto_(top);
        assert_eq!(e.error(), Some(&EmitError::NeedsWideRetry));
    }

    #[test]
    fn test_positions_are_recorded_per_line() {
        let mut pool = ConstantPoolBuilder::new();
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_LINES);
        let mut e = CodeEmitter::new(&mut pool, options);
        // Lines end at source offsets 10, 20 and 30.
        e.set_line_map(Some(LineMap::whole_unit(vec![10, 20, 30])));
        e.iconst_0();
        e.pop();
        e.record_positions_from(0, 5, false);
        e.iconst_1();
        e.pop();
        e.record_positions_from(2, 15, false);
        assert_eq!(e.line_entries(), &[entry(0, 1), entry(2, 2)]);

        // Nothing emitted since 4, and a missing source position.
        e.record_positions_from(4, 25, false);
        e.nop();
        e.record_positions_from(4, 0, false);
        assert_eq!(e.line_entries().len(), 2);

        e.return_();
        e.record_positions_from(4, 25, false);
        let method = e.finish().unwrap();
        assert_eq!(
            method.line_numbers,
            vec![
                LineNumber { start_pc: 0, line_number: 1 },
                LineNumber { start_pc: 2, line_number: 2 },
                LineNumber { start_pc: 4, line_number: 3 },
            ]
        );
        assert!(method.local_variables.is_empty());
    }

    #[test]
    fn test_line_numbers_need_the_lines_attribute() {
        let mut pool = ConstantPoolBuilder::new();
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_VARS);
        let mut e = CodeEmitter::new(&mut pool, options);
        e.set_line_map(Some(LineMap::whole_unit(vec![10, 20, 30])));
        e.iconst_0();
        e.ireturn();
        e.record_positions_from(0, 15, false);
        assert!(e.line_entries().is_empty());
        assert!(e.finish().unwrap().line_numbers.is_empty());
    }

    #[test]
    fn test_removed_goto_trims_debug_tables() {
        let mut pool = ConstantPoolBuilder::new();
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_LINES | ATTR_VARS);
        let mut e = CodeEmitter::new(&mut pool, options);
        e.set_line_map(Some(LineMap::whole_unit(vec![10, 20, 30])));
        let x = local(&mut e, "x", 0, 1);
        e.add_visible_local(x);
        e.iconst_0();
        e.istore(0);
        e.record_positions_from(0, 5, false);
        let end = e.new_label();
        e.goto_(end);
        e.record_positions_from(2, 15, false);
        e.remove_variable(x);
        assert_eq!(e.live_ranges(x), &[LiveRange { start: 0, end: Some(5) }]);

        e.place(end);
        assert_eq!(e.code().len(), 2);
        assert_eq!(e.live_ranges(x), &[LiveRange { start: 0, end: Some(2) }]);
        assert_eq!(e.line_entries(), &[entry(0, 1), entry(2, 2)]);

        // The entry at 2 describes no code any more.
        let method = e.finish().unwrap();
        assert_eq!(method.line_numbers, vec![LineNumber { start_pc: 0, line_number: 1 }]);
        assert_eq!(method.local_variables.len(), 1);
        let variable = &method.local_variables[0];
        assert_eq!((variable.start_pc, variable.length, variable.index), (0, 2, 0));
    }

    #[test]
    fn test_scope_exit_keeps_listed_locals() {
        let mut pool = ConstantPoolBuilder::new();
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_VARS);
        let mut e = CodeEmitter::new(&mut pool, options);
        let a = local(&mut e, "a", 0, 1);
        let b = local(&mut e, "b", 1, 1);
        let c = local(&mut e, "c", 2, 2);
        for id in [a, b, c] {
            e.add_visible_local(id);
        }
        e.iconst_0();
        e.istore(0);
        e.exit_user_scope_except(ScopeId(1), &[b]);
        assert_eq!(e.visible_locals(), &[b, c]);
        assert_eq!(e.live_ranges(a), &[LiveRange { start: 0, end: Some(2) }]);
        assert_eq!(e.live_ranges(b), &[LiveRange { start: 0, end: None }]);

        e.nop();
        e.remove_variable(b);
        e.remove_variable(c);
        let method = e.finish().unwrap();
        let lengths: Vec<(u16, u16)> = method
            .local_variables
            .iter()
            .map(|variable| (variable.index, variable.length))
            .collect();
        assert_eq!(lengths, vec![(0, 2), (1, 3), (2, 3)]);
        assert!(method.line_numbers.is_empty());
    }

    #[test]
    fn test_code_appended_after_scope_exit_extends_ranges() {
        let mut pool = ConstantPoolBuilder::new();
        let options = CodegenOptions::new(TargetLevel::Jdk1_8, ATTR_VARS);
        let mut e = CodeEmitter::new(&mut pool, options);
        let y = local(&mut e, "y", 0, 1);
        let z = local(&mut e, "z", 1, 2);
        e.add_visible_local(y);
        e.add_visible_local(z);
        e.iconst_0();
        e.istore(0);
        e.exit_user_scope(ScopeId(1));
        assert_eq!(e.visible_locals(), &[z]);
        e.nop();
        e.update_last_recorded_end_pc(ScopeId(1), 2);
        assert_eq!(e.live_ranges(y), &[LiveRange { start: 0, end: Some(3) }]);
        assert_eq!(e.live_ranges(z), &[LiveRange { start: 0, end: None }]);
    }
}
