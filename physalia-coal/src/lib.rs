//! Time-scaled coalescent trees for the physalia toolkit.
//!
//! `physalia-coal` ingests annotated Newick strings produced by Bayesian
//! phylogeographic inference and builds an in-memory, time-scaled tree
//! supporting structural transformation and quantitative analysis:
//!
//! - **Parsing** — annotated Newick with discrete states, continuous
//!   traits, rates, and explicit migration events ([`newick`])
//! - **Trunk marking** — flagging lineages ancestral to present-day
//!   samples ([`trunk`])
//! - **Tree algebra** — pruning to label/tip/time subsets, time-window
//!   trimming and slicing, sectioning, padding ([`prune`], [`slice`])
//! - **Statistics** — diversity, Tajima's D, Fst, coalescent and
//!   migration rates, persistence, diffusion coefficients ([`stats`])
//! - **Skyline series** — regular-interval resampling of
//!   concurrent-lineage statistics ([`skyline`])
//! - **Layout** — rectangular and radial plotting coordinates
//!   ([`drawing`])
//!
//! Trees are arenas of nodes addressed by stable indices; transformations
//! mutate in place and statistics are pure reads. Stochastic operations
//! take an explicit seedable [`Xorshift64`] so runs reproduce.

pub mod drawing;
pub mod newick;
pub mod node;
pub mod prune;
pub mod rng;
pub mod series;
pub mod skyline;
pub mod slice;
pub mod stats;
pub mod tree;
pub mod trunk;

pub use node::{Label, Node, NodeId};
pub use rng::Xorshift64;
pub use series::Series;
pub use skyline::{SkylineSeries, DEFAULT_STEP_SIZE};
pub use stats::CoalConfig;
pub use tree::CoalescentTree;
