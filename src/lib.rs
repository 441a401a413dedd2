//! # arenaio - A Fixed-Arena Allocator and Block-Cached File I/O
//!
//! This crate provides two replacements for C library primitives:
//!
//! - [`Heap`]: a **first-fit allocator** over one fixed-size arena mapped
//!   once with `mmap(2)`, standing in for `malloc`/`free`.
//! - [`File`]: a **single-block cache** over a raw file descriptor, standing
//!   in for buffered `stdio` streams.
//!
//! ## Heap Overview
//!
//! ```text
//!   Arena (capacity fixed at construction):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ offset 0                                                    capacity │
//!   │   ┌──────┬──────────┬─────┬────────────┬─────────────────────────┐   │
//!   │   │  A1  │   FREE   │ A2  │    FREE    │           A3            │   │
//!   │   └──────┴──────────┴─────┴────────────┴─────────────────────────┘   │
//!   │              ▲                  ▲                                    │
//!   │              └──── free list ───┘  (ordered by offset)               │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   allocate(n): take the FIRST free extent with room, carve n bytes off
//!                its low end.
//!   release(p):  give the bytes back, merging with a free neighbour on
//!                either side.
//! ```
//!
//! Allocation metadata lives outside the arena, in a table keyed by arena
//! offset, so the arena holds nothing but user data. Every returned pointer
//! is aligned to [`align::MIN_ALIGNMENT`] and every allocation is a whole
//! number of such granules.
//!
//! ## File Overview
//!
//! ```text
//!   File (read mode)
//!   ┌────────────────────────────────────────────────────────────┐
//!   │ file:   ....[ tag ─── pos_tag ─── end_tag ]............... │
//!   │                 ▲                    ▲                     │
//!   │                 │                    └─ descriptor is here │
//!   │            read_byte() serves from the window, refills     │
//!   │            one block at a time when pos_tag == end_tag     │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each open `File` owns its own window; nothing is shared between handles.
//!
//! ## Crate Structure
//!
//! ```text
//!   arenaio
//!   ├── align      - Alignment macros (align!, align_to!) and MIN_ALIGNMENT
//!   ├── config     - ArenaConfig, CacheConfig
//!   ├── error      - AllocError, IoError, InvariantViolation
//!   ├── extent     - Extent (offset, len) ranges
//!   ├── free_list  - Ordered, coalescing free list (internal)
//!   ├── region     - mmap-backed arena memory (internal)
//!   ├── heap       - Heap implementation
//!   ├── stats      - Statistics snapshot
//!   ├── sys        - Raw descriptor calls with EINTR retry (internal)
//!   ├── cache      - CacheWindow
//!   └── file       - File, Mode
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arenaio::{ArenaConfig, File, Heap, Mode};
//!
//! let mut heap = Heap::new(ArenaConfig::default()).unwrap();
//! let ptr = heap.allocate(64).unwrap();
//! unsafe { ptr.as_ptr().write(42) };
//! heap.release(ptr.as_ptr()).unwrap();
//! println!("{}", heap.statistics());
//!
//! let mut input = File::open("in.txt", Mode::Read).unwrap();
//! let mut output = File::open("out.txt", Mode::Write).unwrap();
//! while let Some(byte) = input.read_byte().unwrap() {
//!   output.write_byte(byte).unwrap();
//! }
//! output.close().unwrap();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal locking; every mutating call
//!   takes `&mut self`.
//! - **Fixed capacity**: the arena never grows.
//! - **One direction per file**: a `File` is read-only or write-only.
//! - **Unix-only**: requires `libc` (POSIX systems).

pub mod align;
mod cache;
mod config;
mod error;
mod extent;
mod file;
mod free_list;
mod heap;
mod region;
mod stats;
mod sys;

pub use cache::CacheWindow;
pub use config::{ArenaConfig, CacheConfig, DEFAULT_ARENA_SIZE, DEFAULT_BLOCK_SIZE};
pub use error::{AllocError, InvariantViolation, IoError, Result};
pub use extent::Extent;
pub use file::{File, Mode};
pub use heap::{Heap, Leak};
pub use stats::Statistics;
