//! # Homebase Index
//!
//! Incremental, local-first indexing of a personal photo and document
//! collection.
//!
//! Photos are normalized, run through a face extractor and stored with their
//! faces in a relational index; documents have their text extracted and
//! embedded into a vector store. Every file is gated by a content hash, so
//! rescanning an unchanged tree does no extraction work at all.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │  Scanner    │──▶│ Face extractor   │──▶│  Index Store    │
//! │ walk + hash │   │ (images)         │   │ media/faces/... │
//! │             │   ├──────────────────┤   ├─────────────────┤
//! │             │──▶│ Embedder (docs)  │──▶│  Vector Store   │
//! └─────────────┘   └──────────────────┘   └────────┬────────┘
//!                                                   │
//!                                 ┌─────────────────┤
//!                                 ▼                 ▼
//!                           ┌──────────┐      ┌──────────┐
//!                           │   CLI    │      │   HTTP   │
//!                           │  (hbi)   │      │  server  │
//!                           └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hbi init                             # create database
//! hbi scan images ~/Pictures           # index photos and faces
//! hbi scan documents ~/Documents       # index and embed documents
//! hbi person add "Alice"
//! hbi face link 12 "Alice"
//! hbi search person "Alice"
//! hbi search documents "tax return 2023"
//! hbi serve                            # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content hashing |
//! | [`normalize`] | Image decoding and JPEG normalization |
//! | [`extract`] | Document text extraction |
//! | [`face`] | Face extractor abstraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index_store`] | Media files, faces and persons |
//! | [`vector_store`] | Document vectors |
//! | [`scanner`] | Incremental scanning and pruning |
//! | [`query`] | Person lookup and semantic search |
//! | [`services`] | Component wiring |
//! | [`server`] | HTTP server |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod face;
pub mod fingerprint;
pub mod index_store;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod query;
pub mod scanner;
pub mod server;
pub mod services;
pub mod stats;
pub mod vector_store;
