pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, info, kv, provenance, success, warn};
pub use table::{effective_settings_table, hits_table, record_table, settings_table, TableBuilder};
pub use theme::{theme, Theme};
