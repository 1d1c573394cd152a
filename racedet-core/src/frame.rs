use crate::access_set::AccessSet;

/// Tag identifying the sync statement that will eventually collapse a
/// [`Continuation`](FrameKind::Continuation) frame. Meaningless for
/// [`Task`](FrameKind::Task) frames.
pub type SyncReg = u32;

/// Sentinel `sync_reg` used by `Task` frames, which don't belong to any
/// particular sync region.
pub const NO_SYNC_REG: SyncReg = SyncReg::MAX;

/// Discriminates whether a frame represents a spawned child's strand or
/// the parent's post-detach continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Task,
    Continuation,
}

static_assertions::assert_eq_size!(FrameKind, u8);

/// A shadow-stack frame: the serial and parallel read/write access sets
/// accumulated by one strand (or continuation) of a fork-join region.
#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub sync_reg: SyncReg,
    pub sr: AccessSet,
    pub sw: AccessSet,
    pub pr: AccessSet,
    pub pw: AccessSet,
    /// Serial writes registered since this frame's own content was last
    /// self-checked against its `PW` (at the last `merge_into_parent` it
    /// received, or at its own fold if it has never received one). Unlike
    /// `sw`, this is retired (cleared) each time that check runs, so a
    /// write already checked against the `PW` established by one joined
    /// sibling is never re-checked against a *later* sibling's
    /// contribution, which it happens-before by construction.
    pub pending_sw: AccessSet,
    /// Same as `pending_sw`, for reads.
    pub pending_sr: AccessSet,
    /// Lowest address covered by any `after_alloca` seen while this frame
    /// is the live function frame. `None` until the first alloca.
    pub alloca_low: Option<crate::address::Address>,
    /// Highest address (exclusive) covered by any `after_alloca` seen
    /// while this frame is the live function frame.
    pub alloca_high: Option<crate::address::Address>,
}

impl Frame {
    pub fn new_task() -> Self {
        Self {
            kind: FrameKind::Task,
            sync_reg: NO_SYNC_REG,
            sr: AccessSet::new(),
            sw: AccessSet::new(),
            pr: AccessSet::new(),
            pw: AccessSet::new(),
            pending_sw: AccessSet::new(),
            pending_sr: AccessSet::new(),
            alloca_low: None,
            alloca_high: None,
        }
    }

    pub fn new_continuation(sync_reg: SyncReg) -> Self {
        Self {
            kind: FrameKind::Continuation,
            sync_reg,
            sr: AccessSet::new(),
            sw: AccessSet::new(),
            pr: AccessSet::new(),
            pw: AccessSet::new(),
            pending_sw: AccessSet::new(),
            pending_sr: AccessSet::new(),
            alloca_low: None,
            alloca_high: None,
        }
    }

    pub fn is_task(&self) -> bool {
        self.kind == FrameKind::Task
    }

    pub fn is_continuation_for(&self, sync_reg: SyncReg) -> bool {
        self.kind == FrameKind::Continuation && self.sync_reg == sync_reg
    }
}
