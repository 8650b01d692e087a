pub mod board;
pub mod news;

pub use board::{classify_limit_up, is_main_board, is_top_gainer_eligible};
pub use news::{label_news, related_news, DEFAULT_RELATED_NEWS};
