#![forbid(unsafe_code)]

pub mod caption;
pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod fsutil;
pub mod genai;
pub mod history;
pub mod logging;
pub mod manifest;
pub mod narration;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod visuals;
pub mod wav;
