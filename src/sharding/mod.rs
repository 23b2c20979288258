//! Shard routing
//!
//! Routable statements (SELECT/INSERT/UPDATE/DELETE naming a table after
//! `FROM`/`INTO`) run on the shard backend their table is assigned to. The
//! primary spreads new tables round-robin; a secondary puts tables it has not
//! been told about on shard 0 and pins the assignments the primary announces.
//!
//! Once assigned, a table's shard never changes for the life of the process.

mod router;

pub use router::{AllocationPolicy, PinOutcome, Route, ShardRouter};
