pub mod aggregate;
pub mod bench;
pub mod config;
pub mod grid;
pub mod plot;
pub mod record;
pub mod sweep;
pub mod util;
pub mod writer;
