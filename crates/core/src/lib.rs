#![forbid(unsafe_code)]

pub mod api;
pub mod grouping;
pub mod model;
pub mod replay;
pub mod time;

pub use time::Clock;
