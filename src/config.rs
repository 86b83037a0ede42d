/// 配置管理模組
///
/// 負責加載、驗證和管理確認引擎、維護窗口與通知限流的配置。
/// 支持從開發與生產兩種環境中加載不同的配置，環境變數可覆寫檔案設定。
pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigLoader, Environment};
pub use manager::{get_config, init_config};
pub use types::*;
pub use validation::{ValidationError, ValidationUtils, Validator};
