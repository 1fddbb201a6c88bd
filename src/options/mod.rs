//! Request option schema and tiered resolution.
//!
//! The schema declares every tunable completion parameter once; the
//! resolver folds the four precedence tiers (request > channel > process >
//! built-in) into one effective record per request.

pub mod resolver;
pub mod schema;

pub use resolver::{EffectiveOptions, resolve};
pub use schema::{FieldKind, FieldSpec, FieldValue, OptionsPatch};
