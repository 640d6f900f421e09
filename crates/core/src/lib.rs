//! # Kairos Core
//!
//! 行情会话与实时报价刷新的领域核心：实体、错误、端口 (Trait) 与配置。
//! 本 crate 不包含任何具体实现，所有适配器由外部 crate 注入。

pub mod common;
pub mod config;
pub mod market;
