//! Interfaces to Google Cloud.

mod auth;
pub(crate) mod bigquery;
mod client;

pub(crate) use client::{percent_encode, Client, ClientError, Idempotency, NoQuery};
