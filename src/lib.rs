//! # scancatch
//!
//! Captures HTTP `POST` requests from devices on the local network (barcode
//! and QR scanners, phone shortcuts, scripts), stores them in SQLite, keeps
//! a live feed of the most recent captures, and puts a capture's body on the
//! system clipboard on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  POST  ┌──────────────┐ insert ┌──────────┐
//! │  client  │───────▶│   capture    │───────▶│  SQLite  │
//! └──────────┘        │  middleware  │        └──────────┘
//!                     └──────┬───────┘
//!                            │ notify (bounded mailbox)
//!                            ▼
//!                     ┌──────────────┐  copy  ┌──────────────┐
//!                     │ UiLoop/feed  │───────▶│  Deliverer   │──▶ clipboard
//!                     └──────────────┘        └──────────────┘    or manual copy
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite request store |
//! | [`capture`] | POST capture middleware |
//! | [`server`] | Router and the `serve` loop |
//! | [`listener`] | Listener start/stop lifecycle |
//! | [`feed`] | Live feed and capture mailbox |
//! | [`delivery`] | Clipboard strategy chain and manual fallback |
//! | [`history`] | `recent`, `show` and `copy` commands |

pub mod capture;
pub mod config;
pub mod db;
pub mod delivery;
pub mod feed;
pub mod history;
pub mod listener;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
