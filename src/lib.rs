//! PALIMPSEST - In-Memory MVCC Record Store
//!
//! A keyed collection of records where every write creates a new version
//! instead of overwriting, and readers see a consistent snapshot chosen by a
//! logical timestamp (a transaction ID).
//!
//! ## Features
//! - **Version chains**: arena-backed, index-linked, newest first
//! - **Transactions**: monotonic IDs doubling as timestamps; commit and abort
//! - **Commit stamping**: superseded versions are closed at commit time
//! - **Write-write coordination**: updates wait for a foreign pending head
//!   to settle, without holding the store lock
//! - **Similarity reads**: top-k visible versions by cosine distance
//! - **Metrics**: Lock-free atomic counters for observability
//! - **Shell**: line-oriented command interpreter
//!
//! ## Example
//! ```
//! use palimpsest::engine::concurrent::Store;
//! use palimpsest::types::Payload;
//!
//! let store = Store::new();
//!
//! let t1 = store.begin();
//! store.insert(t1, b"a".to_vec(), Payload::new("p1")).unwrap();
//! store.commit(t1).unwrap();
//!
//! let t2 = store.begin();
//! store.update(t2, b"a".to_vec(), Payload::new("p2")).unwrap();
//! store.commit(t2).unwrap();
//!
//! assert_eq!(store.read(t2)[0].payload.value, "p2");
//! assert_eq!(store.read(t1)[0].payload.value, "p1");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod shell;
pub mod types;
