pub mod array;
pub mod basket;
pub mod branch;
pub mod cache;
pub mod config;
pub mod entry_range;
pub mod error;
pub mod fixture;
pub mod helpers;
pub mod interpretation;
pub mod iterate;
pub mod language;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod tree;

pub use crate::array::{Array, JaggedArray, RecordArray};
pub use crate::config::{ArraysRequest, CacheChoice, CacheSetting, ReaderOptions};
pub use crate::error::{ReadError, Result};
pub use crate::interpretation::{ArrayGroup, Columns, How};
pub use crate::iterate::{concatenate, iterate};
pub use crate::tree::{Report, Tree, TreeIterator, TreeMeta};
