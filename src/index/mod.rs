//! The three-tier index (spec §4.2-§4.5): dynamic (open buffers), background
//! (persistent shard store), static (read-only snapshot), and the merged
//! query façade over all three.

pub mod background;
pub mod dynamic;
pub mod maps;
pub mod merged;
pub mod query;
pub mod static_index;
