pub mod code;

pub use code::{Category, Code, CodeEntry, CodeState, SUFFIX_LEN};
