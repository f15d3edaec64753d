pub mod history;
pub mod search;
pub mod summarize;
pub mod tokens;
pub mod transcript;
pub mod webhook;

pub use history::*;
pub use search::*;
pub use summarize::*;
pub use tokens::*;
pub use transcript::*;
pub use webhook::*;
