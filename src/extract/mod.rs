pub mod embedded;
pub mod rooms;

pub use embedded::{extract, extract_all, extract_price};
pub use rooms::{analyze_page, PageAnalysis, RoomBlock};
