//! 券商代理 HTTP 行情适配器。

pub mod brokerage;
