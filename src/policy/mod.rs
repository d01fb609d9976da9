mod filter;
mod key;
mod rename;

pub use filter::{DefaultFieldFilter, FieldFilter, FilterConfig};
pub use key::KeySelector;
pub use rename::{FieldRenamer, RenameRule, RenameTable};
