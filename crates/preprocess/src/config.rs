/// Square input resolution used by YOLO-family exports.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Grey value used for the letterbox padding.
pub const LETTERBOX_COLOR: u8 = 114;
