pub mod comparator;
pub mod dispatcher;
pub mod engine;
pub mod entry;
pub mod listing;
pub mod path_map;

#[cfg(test)]
pub(crate) mod testing;

pub use comparator::{classify, Decision, FileComparator, SkipReason, SyncAction};
pub use dispatcher::{DispatchOutcome, Dispatcher, SyncProgress};
pub use engine::{Direction, SyncConfig, SyncEngine, SyncPlan, SyncReport, SyncStatus};
pub use entry::{hex_size, Entry, EntryKind, TransferRoot};
pub use listing::{EntryReader, EntrySource, ListingFormat, ListingParser, RemoteRecord};
pub use path_map::{map_path, PathMapError};
