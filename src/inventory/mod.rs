// Inventory records: normalization, checksums, batching and local collection
pub mod types;
pub mod normalize;
pub mod checksum;
pub mod batch;
pub mod collect;

pub use batch::{batch_from_records, prepare_batch};
pub use checksum::{checksum_for_records, compute_checksum, verify_checksum};
pub use collect::collect_local_record;
pub use normalize::expand_for_transmission;
