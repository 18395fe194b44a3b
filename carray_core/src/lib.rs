pub mod array;
pub mod cache;
pub mod carray;
pub mod codec;
pub mod config;
pub mod constructors;
pub mod ctable;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expr;
pub mod iter;
pub mod shuffle;
pub mod store;
pub mod utils;

pub use array::{Array, Element};
pub use cache::{CacheStats, ChunkCache};
pub use carray::CArray;
pub use codec::Codec;
pub use config::{ArrayOptions, CParams, DEFAULT_CACHE_CAPACITY, DEFAULT_CLEVEL, MAX_CLEVEL};
pub use constructors::{arange, fill, fromiter, ones, zeros};
pub use ctable::{ColumnData, CTable, Predicate, Row, RowIter, Rows, NROW};
pub use dtype::{DType, ScalarKind, Value};
pub use engine::{detect_number_of_cores, nthreads, set_nthreads, version};
pub use error::{Error, Result};
pub use eval::{eval, EvalOutput, Operand, Vars};
pub use iter::{Iter, WhereIter, WhereTrueIter};
pub use store::{calc_chunklen, Chunk, ChunkStore};
