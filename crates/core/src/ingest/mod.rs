pub mod error;
pub mod hot_stocks;
pub mod http;
pub mod market;

pub use error::FetchError;
pub use hot_stocks::HotStockScanner;
pub use http::{FeedEndpoints, FeedHttp};
pub use market::MarketSnapshotFetcher;
