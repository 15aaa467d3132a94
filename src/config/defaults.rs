pub const DEFAULT_COLS: u16 = 80;
pub const MIN_COLS: u16 = 20;
pub const MAX_COLS: u16 = 1000;
