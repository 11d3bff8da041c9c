pub mod config;
pub mod notify;
mod parser;
pub mod portal;
pub mod state;
pub mod types;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use parser::{
    ExtractError, PageTable, RowKind, TableRow, extract_term_grades, parse_page_tables,
};
pub use portal::{BrowserPortal, Portal, PortalError};
pub use state::{SeenStore, StateError};
pub use watcher::{PollOutcome, Watcher};
