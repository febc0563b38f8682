/// Minimal width and height of a box considered non-empty.
pub const DEFAULT_BOX_THRESHOLD: f32 = 0.00001;

/// Identifier of an absent or invalidated instance.
pub const DUMMY_INSTANCE_ID: i64 = -1;

/// Category assigned to labels which have no counterpart in the target label space.
pub const IGNORE_CATEGORY_ID: i64 = -1;

/// Bounds of the pseudo video length drawn for still-image clips, `[min, max)`.
pub const PSEUDO_VIDEO_LENGTH_MIN: usize = 16;
pub const PSEUDO_VIDEO_LENGTH_MAX: usize = 49;

pub const DEFAULT_SAMPLING_FRAME_NUM: usize = 2;
pub const DEFAULT_SAMPLING_FRAME_RANGE: usize = 5;
pub const DEFAULT_NUM_CLASSES: i64 = 40;
