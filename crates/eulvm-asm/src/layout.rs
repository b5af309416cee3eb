/// Fixed memory cell holding the current call frame's base address, a
/// deliberate part of the calling convention. The frame pointer grows
/// *downward* from [`FRAME_REGION_BASE`]; a stack-frame variable at
/// frame offset `k` lives at `frame_base - k`.
pub const FRAME_POINTER_CELL: u64 = 0;

/// First address after the frame-pointer cell: where the emitter starts
/// placing static globals and constant/string literals.
pub const STATIC_REGION_BASE: u64 = 32;

/// Base address the frame pointer is initialized to before the entry
/// trampoline runs. Chosen far enough past [`STATIC_REGION_BASE`] that a
/// reasonably sized module's globals and constants don't collide with
/// the frame region growing down from it.
pub const FRAME_REGION_BASE: u64 = 65_536;
