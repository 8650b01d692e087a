pub mod contract;
pub mod hot_stock;
pub mod market;
pub mod recommendation;
