//! Rota Feed Library
//!
//! Local service behind the volunteer dashboard: it loads assistance cases
//! from the hosted backend page by page, filters and ranks them for one
//! volunteer, and carries out the volunteer's actions on them.
//!
//! # Modules
//!
//! - `backend`: Online/offline backend selection.
//! - `circuit_breaker`: Circuit breaker for backend calls.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `feed`: Paged, de-duplicated case list.
//! - `geo`: Distances and viewer location.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `pipeline`: Filtering and sorting of the feed.
//! - `realtime`: Message subscription of the open case.
//! - `service`: Volunteer actions over the session.
//! - `session`: Session view state.
//! - `supabase`: Hosted backend REST client.
//! - `timeline`: Case activity timeline.

pub mod backend;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod feed;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod realtime;
pub mod service;
pub mod session;
pub mod supabase;
pub mod timeline;
