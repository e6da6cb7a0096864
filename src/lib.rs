//! # subtree-core
//!
//! Materializes bill-of-materials SUB trees from flat node lists and keeps a single selection in
//! sync with a server-held session.
//!
//! ## Overview
//!
//! A dataset ("SUB") is a [`model::Tree`]: a name plus a flat list of nodes where each node names
//! its parent by id. The crate turns that list into an ordered forest, renders it as nested row
//! views with connector geometry, and drives selection and editing of one node at a time.
//!
//! ```text
//! DatasetGateway ──► App ──► Hierarchy ──► RenderedTree ──► apply_connectors
//!        ▲            │
//!        └── SessionSync (best-effort saves)
//! ```
//!
//! ## Architecture
//!
//! - **[`model`]**: `Node`, `Tree`, `NodeId`, `NodePatch`, `SessionState`
//! - **[`hierarchy`]**: parent/child index and forest diagnostics
//! - **[`render`]**: nested row views, connector geometry pass, text outline
//! - **[`selection`]** and **[`detail`]**: selected node and its edit form
//! - **[`app`]**: the controller owning all application state
//! - **[`gateway`]** and **[`session`]**: network seam and session mirroring
//! - **`store`** and **`server`** (feature `service`): the HTTP side
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "client")]
//! # async fn example() -> subtree_core::Result<()> {
//! use std::sync::Arc;
//! use subtree_core::{app::App, gateway::HttpGateway, render::outline};
//!
//! let gateway = Arc::new(HttpGateway::new("http://127.0.0.1:9037")?);
//! let app = App::new(gateway);
//! app.restore().await;
//! app.load_dataset("Lamp").await?;
//! app.select("2")?;
//! println!("{}", outline(&app.rendered()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **default**: `service` + `client`
//! - **service**: axum server and tree/session store
//! - **client**: reqwest-backed [`gateway::HttpGateway`]
//! - **bin**: the `subtree` command line tool

pub mod app;
pub mod config;
pub mod detail;
pub mod error;
pub mod event;
pub mod gateway;
pub mod hierarchy;
#[cfg(feature = "service")]
pub mod ingest;
pub mod model;
pub mod render;
pub mod selection;
#[cfg(feature = "service")]
pub mod server;
pub mod session;
#[cfg(feature = "service")]
pub mod store;
#[cfg(test)]
mod tests;

pub use error::*;
