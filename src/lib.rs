//! # mudmigrate - Persistence and Migration Layer for a MUD Server
//!
//! Game state (users, rooms, templates, live room and merchant state, admin
//! lists, bug reports, high scores and two configuration singletons) can live in
//! one of three backends:
//!
//! - **documents**: one JSON file per collection in a data directory
//! - **embedded-relational**: a single SQLite database file
//! - **networked-relational**: a PostgreSQL server
//!
//! This crate moves that state between backends without loss and records which
//! backend the game server should open next.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mudmigrate::config::Config;
//! use mudmigrate::migrate::Migrator;
//! use mudmigrate::storage::BackendKind;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("mudmigrate.toml").await?;
//!     let active = config.resolve_active(None)?;
//!     let migrator = Migrator::new(config, active, false);
//!
//!     println!("{}", migrator.status().await);
//!     println!("{}", migrator.switch(BackendKind::EmbeddedRelational).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`entities`] - declarative entity catalogue and the document/row codec
//! - [`storage`] - backend connector, schema manager, backups and the state file
//! - [`migrate`] - status, export, import, backup and switch
//! - [`config`] - TOML configuration
//! - [`errors`] - error taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Migrator     │ ← status / export / import / backup / switch
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Entity Codec   │ ← document <-> row, defaults, coercions
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Backends     │ ← JSON files, SQLite, PostgreSQL
//! └─────────────────┘
//! ```

pub mod config;
pub mod entities;
pub mod errors;
pub mod logutil;
pub mod migrate;
pub mod storage;
