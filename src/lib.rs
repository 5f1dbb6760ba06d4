//! Persistence and analytics for a soundboard chat bot.
//!
//! Soundbase stores sounds, an append-only action log, voice channel sessions,
//! curated lists, trigger keywords and per-user event sounds in one SQLite
//! file, and derives leaderboards, summaries and "year in review" digests
//! from them. Several processes (the bot, scheduled jobs, a dashboard) may
//! share the file; every repository call opens its own short-lived
//! connection, so no state is cached in process.
//!
//! # Guild scoping
//!
//! A sound with `guild_id = None` is shared by every guild. A guild may shadow
//! a shared sound by storing its own row under the same filename; lookups for
//! that guild then resolve to the guild row, and no guild ever sees another
//! guild's rows.
//!
//! # Errors
//!
//! [`db::Store`] operations return [`anyhow::Result`]. The repositories in
//! [`repo`] sit on the boundary to long-running callers: store failures are
//! logged through `tracing` and degrade to an empty or absent result.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite store handle, schema, migrations, and health checks
//! - [`repo`]: Repositories for sounds, actions, voice sessions, lists,
//!   keywords, user events, and composed statistics

pub mod config;
pub mod db;
pub mod repo;
