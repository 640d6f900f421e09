use thiserror::Error;

/// # Summary
/// 行情数据域错误枚举，覆盖网络、超时、解析及数据缺失。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 所有变体均视为瞬时错误：调用方记录日志后在下一个调度周期重试。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    // 网络层错误，包含底层 HTTP 客户端错误信息或非 2xx 状态码
    #[error("Network error: {0}")]
    Network(String),
    // 请求超时
    #[error("Request timed out: {0}")]
    Timeout(String),
    // 响应体无法解析为约定的结构
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据不存在 (如报价缺失)
    #[error("Data not found: {0}")]
    NotFound(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
