pub mod error;
pub mod flow;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod price;
pub mod selectors;
pub mod static_page;
pub mod template;

#[cfg(test)]
mod test_support;

pub use error::{FlowError, PageError};
pub use flow::{build_url, run_one, ResultRow};
pub use output::{assemble_row, OutputRow, OutputSchema, NOT_FOUND_CODE, OUTPUT_FIELDS};
pub use page::{Element, Navigation, Page};
pub use pipeline::{run_batch, BatchSummary, DebugCapture};
pub use price::normalize_price_text;
pub use selectors::{first_value, parse_selector, resolve, SelectorMode, SelectorSpec};
pub use static_page::StaticHtmlPage;
