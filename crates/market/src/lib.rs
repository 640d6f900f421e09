//! 详情页实时行情：交易时段解析、报价跟踪、分桶价格序列与刷新调度。

pub mod book;
pub mod buffer;
pub mod quote;
pub mod refresher;
pub mod series;
pub mod session;
pub mod task;
