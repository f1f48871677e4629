/// UI module exports

pub mod bridge;
pub mod components;
pub mod labels;
pub mod panel;
