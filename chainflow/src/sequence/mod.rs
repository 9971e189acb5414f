//! Sequence adapters.
//!
//! Chains whose value is a sequence get element-wise nodes. Two shapes are
//! supported:
//!
//! - bounded sequences, `Chain<Vec<T>>`, where every node sees the whole
//!   collection and outputs keep input order, even under fan-out;
//! - streamed sequences, `Chain<ItemStream<T>>`, where mapping nodes stay
//!   lazy and concurrent mapping yields results as they complete.
//!
//! Every element-wise node checks for cancellation before each element (or
//! chunk), so a cancelled chain stops handing out new work. Fan-out units
//! that already started are left to finish.
//!
//! ```rust,ignore
//! let sums = Chain::from_items(1..=5)
//!     .chunk(2)
//!     .map_each(|chunk| chunk.iter().sum::<i32>())
//!     .await?;
//! assert_eq!(sums, vec![3, 7, 5]);
//! ```

mod bounded;
mod fanout;
mod stream;
mod streamed;

pub use stream::ItemStream;
