//! Firmware implementations
//!
//! Supported controllers:
//! - Lihuiyu: M2/M3/B1/B2 style boards (K40 lasers) speaking the LHYMICRO-GL
//!   byte protocol

pub mod lihuiyu;

pub use lihuiyu::{LihuiyuDriver, RealtimeHandle};
