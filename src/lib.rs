//! Session and authentication client for the Lucky Lotto storefront.
//!
//! The hosted backend (auth, profile table, change feeds) sits behind
//! [`backend::AuthBackend`]. [`session::SessionStore`] keeps the observable
//! "who is signed in" state, [`auth::AuthService`] runs the account
//! operations, and [`flows::Flows`] adds the form-level behavior of each page.

pub mod app;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod flows;
pub mod forms;
pub mod notify;
pub mod session;
