// utils.rs - 公共工具模組
//
// 提供通用的序列化輔助函數，供領域模型在邊界處正規化鬆散的輸入。

pub mod serde_helpers;

pub use serde_helpers::empty_string_as_none;
