//! I/O expanders

pub mod mcp23017;
