use crate::access_set::AccessSet;
use crate::address::Address;
use crate::error::{Anomaly, EngineError};
use crate::frame::{Frame, FrameKind, SyncReg};

/// Outcome of a `join`, `enter_serial`, or `reduce` operation: whether the
/// two (or more) logically-parallel regions just merged touched disjoint
/// memory, and if not, the addresses that prove otherwise.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RaceOutcome {
    pub witness: Vec<Address>,
}

impl RaceOutcome {
    fn new(witness: Vec<Address>) -> Self {
        Self { witness }
    }

    pub fn disjoint(&self) -> bool {
        self.witness.is_empty()
    }
}

/// Which of the two documented reducer strategies a `reduce` call uses.
/// See `enum4.3.6` in the spec: Strategy A defers race checking to the
/// next `join`/`enter_serial`; Strategy B performs an immediate
/// "soft-join" check at reduce time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceStrategy {
    /// Append `right`'s frames onto `left`; no race check here.
    Concatenate,
    /// `right` must hold exactly one frame; treat the reduction as an
    /// implicit join against `left`'s top frame.
    SoftJoin,
}

/// Fold `frame.pw`/`frame.pr` into `frame.sw`/`frame.sr`, reporting any
/// overlap into `witness` first.
///
/// This overlap is exactly the "continuation wrote what its own
/// already-joined child wrote" race: `frame.pw` only ever holds
/// addresses written by strands that were, at some point, logically
/// parallel with whatever is *now* accumulating in `frame.sw`. Checking
/// it here (rather than only against the frame below, as the informal
/// per-step description suggests) is what makes a frame's own fold
/// self-consistent; without it a continuation could write over its own
/// already-joined spawn without ever being caught.
///
/// The check only consults `pending_sw`/`pending_sr`, not the full
/// `sw`/`sr`: a frame that outlives more than one merge (a continuation
/// reused across several detaches in the same sync region, via
/// `push_continue`'s idempotency) retires a write from `pending` the
/// first time it is checked against the `PW` established so far. Writes
/// made before detaching some later sibling happen-before that sibling
/// by construction and must never be re-checked against a `PW`
/// contribution that sibling adds afterwards; reusing the full `sw` here
/// would do exactly that.
fn fold_self(frame: &mut Frame, witness: &mut Vec<Address>) {
    AccessSet::intersect(&frame.pending_sw, &frame.pw, witness);
    AccessSet::intersect(&frame.pending_sw, &frame.pr, witness);
    AccessSet::intersect(&frame.pending_sr, &frame.pw, witness);
    AccessSet::union_into(&mut frame.sw, &mut frame.pw);
    AccessSet::union_into(&mut frame.sr, &mut frame.pr);
    frame.pending_sw = AccessSet::new();
    frame.pending_sr = AccessSet::new();
}

/// Merge an already-`fold_self`'d frame `oth` into the enclosing frame
/// `new_top`, the frame exposed once `oth` is popped. Only `new_top`'s
/// `PW`/`PR` participate: `new_top.SW` may hold addresses written strictly
/// before `oth` ever started (happens-before, not parallel), and
/// comparing against it would produce false positives.
///
/// Before folding `oth` in, `new_top`'s own not-yet-checked serial writes
/// are self-checked (and retired) against `new_top`'s current `PW`/`PR` —
/// the contribution of every sibling joined into `new_top` so far, but
/// not `oth`'s, which is added only afterwards. This is what scopes the
/// self-check to genuinely-parallel pairs when `new_top` is a
/// continuation that receives more than one join: a write made before
/// detaching the strand that becomes `oth` is retired here, against the
/// `PW` that predates `oth`, and is never compared again once `oth`'s
/// writes land in `new_top.pw` below.
fn merge_into_parent(new_top: &mut Frame, oth: &mut Frame, witness: &mut Vec<Address>) {
    AccessSet::intersect(&new_top.pending_sw, &new_top.pw, witness);
    AccessSet::intersect(&new_top.pending_sw, &new_top.pr, witness);
    AccessSet::intersect(&new_top.pending_sr, &new_top.pw, witness);
    new_top.pending_sw = AccessSet::new();
    new_top.pending_sr = AccessSet::new();

    AccessSet::intersect(&new_top.pw, &oth.sw, witness);
    AccessSet::intersect(&new_top.pw, &oth.sr, witness);
    AccessSet::intersect(&new_top.pr, &oth.sw, witness);
    AccessSet::union_into(&mut new_top.pw, &mut oth.sw);
    AccessSet::union_into(&mut new_top.pr, &mut oth.sr);
}

/// Symmetric merge of two single-frame, logically-parallel peer views, as
/// used by `reduce`'s Strategy B. Unlike `merge_into_parent`, `SW`-vs-`SW`
/// is a legitimate check here: the reducer contract guarantees `right` is
/// a freshly-identified view that has only ever been touched by code
/// parallel to `left`'s current top, so there is no happens-before
/// history hiding in either side's `SW`.
fn peer_merge(left: &mut Frame, right: &mut Frame, witness: &mut Vec<Address>) {
    AccessSet::intersect(&left.sw, &right.sw, witness);
    AccessSet::intersect(&left.sw, &right.pw, witness);
    AccessSet::intersect(&left.pw, &right.sw, witness);
    AccessSet::intersect(&left.sw, &right.sr, witness);
    AccessSet::intersect(&left.sr, &right.sw, witness);
    AccessSet::intersect(&left.pw, &right.sr, witness);
    AccessSet::intersect(&left.sr, &right.pw, witness);
    AccessSet::intersect(&left.pr, &right.sw, witness);
    AccessSet::intersect(&left.sw, &right.pr, witness);
    AccessSet::union_into(&mut left.sw, &mut right.sw);
    AccessSet::union_into(&mut left.pw, &mut right.pw);
    AccessSet::union_into(&mut left.sr, &mut right.sr);
    AccessSet::union_into(&mut left.pr, &mut right.pr);
}

/// A worker's private view of the fork-join computation's memory
/// accesses: a non-empty sequence of [`Frame`]s, bottom frame first.
///
/// Each worker owns exactly one `ShadowStack`; it is never shared or
/// locked. Cross-worker coordination happens only through [`identity`]
/// and [`reduce`](ShadowStack::reduce) at migration boundaries.
#[derive(Debug)]
pub struct ShadowStack {
    frames: Vec<Frame>,
}

impl ShadowStack {
    /// Create the root view for a worker beginning execution of the
    /// program: a single, empty Task frame representing the outermost
    /// serial context.
    pub fn new_root() -> Self {
        Self {
            frames: vec![Frame::new_task()],
        }
    }

    /// The reducer `identity` hook: a fresh view with no frames at all,
    /// so that a later `reduce` under Strategy A can simply concatenate
    /// frame vectors.
    pub fn identity() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Push a fresh Task frame, unconditionally.
    pub fn push_task(&mut self) {
        self.frames.push(Frame::new_task());
    }

    /// Ensure a Continuation frame tagged `sync_reg` is on top, pushing
    /// one if the current top isn't already that continuation. Used both
    /// by `detach` (step 1 of §4.3.1) and directly by the
    /// `detach_continue` callback, which is the same idempotent "ensure"
    /// operation fired at the continuation's own entry point.
    pub fn push_continue(&mut self, sync_reg: SyncReg) {
        let needs_push = match self.top() {
            Some(f) => !f.is_continuation_for(sync_reg),
            None => true,
        };
        if needs_push {
            self.frames.push(Frame::new_continuation(sync_reg));
        }
    }

    /// Handle a `detach(sync_reg)` event: push a continuation for the
    /// parent's post-detach work if one isn't already there, then push a
    /// fresh Task frame for the spawned child.
    pub fn detach(&mut self, sync_reg: SyncReg) {
        self.push_continue(sync_reg);
        self.push_task();
    }

    pub fn register_write(&mut self, addr: Address) {
        if let Some(f) = self.top_mut() {
            f.sw.insert(addr);
            f.pending_sw.insert(addr);
        }
    }

    pub fn register_read(&mut self, addr: Address) {
        if let Some(f) = self.top_mut() {
            f.sr.insert(addr);
            f.pending_sr.insert(addr);
        }
    }

    /// Record a stack-allocation's range on the current top frame, for
    /// later erasure on function exit (§4.3.5).
    pub fn record_alloca(&mut self, addr: Address, nbytes: u64) {
        if let Some(f) = self.top_mut() {
            let high = Address::new(addr.raw().wrapping_add(nbytes));
            f.alloca_low = Some(match f.alloca_low {
                Some(low) if low.raw() <= addr.raw() => low,
                _ => addr,
            });
            f.alloca_high = Some(match f.alloca_high {
                Some(existing) if existing.raw() >= high.raw() => existing,
                _ => high,
            });
        }
    }

    /// The raw `join` primitive (§4.3.3): pop a Task frame and fold it
    /// into the frame below. Fatal if there's no Task frame to pop.
    pub fn join(&mut self) -> Result<RaceOutcome, EngineError> {
        if self.frames.len() < 2 {
            return Err(EngineError::EmptyStackPop);
        }
        let mut oth = self.frames.pop().unwrap();
        if !oth.is_task() {
            let kind = oth.kind;
            self.frames.push(oth);
            return Err(EngineError::JoinFrameKindMismatch(kind));
        }
        let mut witness = Vec::new();
        fold_self(&mut oth, &mut witness);
        let new_top = self.top_mut().expect("checked len >= 2 above");
        merge_into_parent(new_top, &mut oth, &mut witness);
        Ok(RaceOutcome::new(witness))
    }

    /// Like [`join`](Self::join), but first erases any addresses in the
    /// exiting function's stack-local range from its own `SW` (§4.3.5).
    /// Function entry/exit always comes in matched pairs from the
    /// engine's own instrumentation, so a depth violation here is fatal,
    /// unlike the graceful degradation in [`task_exit`](Self::task_exit).
    pub fn func_exit(&mut self) -> Result<RaceOutcome, EngineError> {
        if self.frames.len() < 2 {
            return Err(EngineError::EmptyStackPop);
        }
        if let Some(top) = self.top_mut() {
            if let (Some(low), Some(high)) = (top.alloca_low, top.alloca_high) {
                top.sw.retain_outside(low, high);
                top.pending_sw.retain_outside(low, high);
            }
        }
        self.join()
    }

    /// The `task_exit` callback's handling (§4.4): identical to `join`,
    /// except a `task_exit` observed when there is no Task frame to pop
    /// is tolerated as a non-fatal instrumentation anomaly (§7) rather
    /// than escalated. Returns `None` in that degraded case.
    pub fn task_exit(&mut self) -> Option<Result<RaceOutcome, EngineError>> {
        if self.frames.len() < 2 {
            Anomaly::TaskExitOnEmptyStack.log();
            return None;
        }
        Some(self.join())
    }

    /// `enter_serial` (§4.3.4): collapse every Continuation frame tagged
    /// `sync_reg` currently on top of the stack.
    pub fn enter_serial(&mut self, sync_reg: SyncReg) -> RaceOutcome {
        let mut witness = Vec::new();
        let mut collapsed_any = false;
        loop {
            let matches = matches!(self.top(), Some(f) if f.is_continuation_for(sync_reg));
            if !matches || self.frames.len() < 2 {
                break;
            }
            collapsed_any = true;
            let mut oth = self.frames.pop().unwrap();
            fold_self(&mut oth, &mut witness);
            let new_top = self.top_mut().expect("checked len >= 2 above");
            merge_into_parent(new_top, &mut oth, &mut witness);
        }
        if !collapsed_any {
            Anomaly::SyncRegionMismatch(sync_reg).log();
        }
        // Step 3 (§4.3.4): fold the now-top frame's PW/PR into its own
        // SW/SR with no self-check. Unlike each collapse above, this
        // frame wasn't itself a continuation for `sync_reg` — it may
        // hold SW entries that predate the whole detached region by an
        // arbitrary amount (happens-before, not parallel), so comparing
        // them against the PW just absorbed from the loop would produce
        // false races. `merge_into_parent` already self-checked this
        // frame's pending writes against its PW at each collapse above;
        // nothing further needs checking here, only settling.
        if let Some(top) = self.top_mut() {
            AccessSet::union_into(&mut top.sw, &mut top.pw);
            AccessSet::union_into(&mut top.sr, &mut top.pr);
            top.pending_sw = AccessSet::new();
            top.pending_sr = AccessSet::new();
        }
        RaceOutcome::new(witness)
    }

    /// Merge `right` into `self` (the left view), consuming `right`.
    /// Returns the race outcome for `ReduceStrategy::SoftJoin`; always
    /// `None` for `ReduceStrategy::Concatenate`, which defers checking.
    pub fn reduce(
        &mut self,
        mut right: ShadowStack,
        strategy: ReduceStrategy,
    ) -> Result<Option<RaceOutcome>, EngineError> {
        match strategy {
            ReduceStrategy::Concatenate => {
                let right_frames = std::mem::take(&mut right.frames);
                self.frames.extend(right_frames);
                Ok(None)
            }
            ReduceStrategy::SoftJoin => {
                if right.frames.len() != 1 {
                    return Err(EngineError::NonEmptyStackTeardown(right.frames.len()));
                }
                let mut right_top = std::mem::take(&mut right.frames).remove(0);
                let left_top = self
                    .top_mut()
                    .ok_or(EngineError::EmptyStackPop)?;
                let mut witness = Vec::new();
                peer_merge(left_top, &mut right_top, &mut witness);
                Ok(Some(RaceOutcome::new(witness)))
            }
        }
    }
}

impl Drop for ShadowStack {
    fn drop(&mut self) {
        if self.frames.len() > 1 {
            EngineError::NonEmptyStackTeardown(self.frames.len()).abort();
        }
    }
}
