//! quotient — quota availability accounting for ticket sales.
//!
//! A quota is a pool of sellable capacity shared by a set of items and
//! variations. The engine answers one question: may more units be sold
//! right now, and how many remain. It subtracts four competing demand
//! sources (paid orders, pending orders, blocking vouchers, cart holds)
//! plus an optional waiting list from the capacity, in a fixed priority
//! order, and memoizes the verdict for a short staleness window.
//!
//! The verdict is an admission hint, not a lock: concurrent callers may see
//! answers that differ within the window, and oversell protection belongs
//! to an atomic check on the commit path downstream.

pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
