pub mod html_renderer;
pub mod sqlite_store;

pub use html_renderer::{CapturedPage, HtmlPageRenderer};
pub use sqlite_store::SqliteEventStore;
