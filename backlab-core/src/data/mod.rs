//! Market data: the feed abstraction, CSV ingest, bar validation rules and
//! synthetic generation.

pub mod feed;
pub mod ingest;
pub mod rules;
pub mod synthetic;

pub use feed::{align_symbols, AlignedFeed, FeedError, PriceFeed};
pub use ingest::{load_csv_path, load_csv_reader, IngestReport};
pub use rules::{apply_rules, sanity_rules, BarField, BarRule, CmpOp, RuleViolation};
pub use synthetic::synthetic_feed;
